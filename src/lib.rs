//! Bluetooth Management protocol engine for the Linux control channel.
//!
//! The kernel exposes controller management as a datagram protocol on a raw
//! HCI socket: commands go down, completions and unsolicited events come
//! back. This crate speaks that protocol: it tracks every controller the
//! kernel announces, sequences the command exchanges that need ordering
//! (service-record updates, deferred power-up), and reports device and
//! pairing events to a host stack through the traits in [`upstream`].
//!
//! ```no_run
//! # use btmgmt::{Config, MgmtSession, MgmtSocket};
//! # use btmgmt::mgmt::session::drive;
//! # async fn run(
//! #    adapters: Box<dyn btmgmt::upstream::AdapterManager + Send>,
//! #    devices: Box<dyn btmgmt::upstream::DeviceManager + Send>,
//! #    keys: Box<dyn btmgmt::upstream::KeyStore + Send>,
//! # ) -> btmgmt::Result<()> {
//! let (tx, mut rx) = MgmtSocket::open()?;
//! let mut session = MgmtSession::new(Box::new(tx), adapters, devices, keys, Config::load()?);
//! session.start()?;
//! drive(&mut session, &mut rx).await
//! # }
//! ```

pub mod address;
pub mod config;
pub mod error;
pub mod mgmt;
pub mod upstream;

pub use address::{Address, AddressType};
pub use config::Config;
pub use error::{MgmtError, Result};
pub use mgmt::session::{MgmtReceiver, MgmtSender, MgmtSession, MgmtSocket};
