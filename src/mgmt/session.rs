//! Control-channel transport and session lifetime.
//!
//! The kernel exposes one datagram socket for controller management. This
//! module opens it, splits it into sender and receiver halves, and owns the
//! `MgmtSession` that ties the controller table, the host collaborators and
//! the transport together. Commands and event handling live in the sibling
//! modules and operate on the same session.

use std::{
   io,
   os::fd::{AsRawFd, FromRawFd, OwnedFd},
};

use log::{debug, info};
use tokio::io::unix::AsyncFd;

use crate::{
   config::Config,
   error::{MgmtError, Result},
   mgmt::{
      protocol::{INDEX_NONE, MGMT_BUF_SIZE, MgmtOpcode},
      registry::ControllerRegistry,
   },
   upstream::{AdapterManager, BasicEirDecoder, DeviceManager, EirDecoder, KeyStore},
};

const BTPROTO_HCI: libc::c_int = 1;
const HCI_DEV_NONE: u16 = 0xFFFF;
const HCI_CHANNEL_CONTROL: u16 = 3;

#[repr(C)]
struct SockaddrHci {
   hci_family: libc::sa_family_t,
   hci_dev: u16,
   hci_channel: u16,
}

/// Outbound half of the control channel. Each call writes one whole frame;
/// the channel has datagram semantics and partial writes are errors.
pub trait Transport: Send {
   fn send(&mut self, frame: &[u8]) -> io::Result<()>;
}

fn open_control_socket() -> io::Result<OwnedFd> {
   // SAFETY: plain socket(2); ownership of the fd is taken immediately.
   let fd = unsafe {
      libc::socket(
         libc::AF_BLUETOOTH,
         libc::SOCK_RAW | libc::SOCK_CLOEXEC | libc::SOCK_NONBLOCK,
         BTPROTO_HCI,
      )
   };
   if fd < 0 {
      return Err(io::Error::last_os_error());
   }
   // SAFETY: fd was just returned open by socket(2).
   let fd = unsafe { OwnedFd::from_raw_fd(fd) };

   let addr = SockaddrHci {
      hci_family: libc::AF_BLUETOOTH as libc::sa_family_t,
      hci_dev: HCI_DEV_NONE,
      hci_channel: HCI_CHANNEL_CONTROL,
   };
   // SAFETY: addr is a valid sockaddr_hci for the lifetime of the call.
   let ret = unsafe {
      libc::bind(
         fd.as_raw_fd(),
         (&raw const addr).cast::<libc::sockaddr>(),
         size_of::<SockaddrHci>() as libc::socklen_t,
      )
   };
   if ret < 0 {
      return Err(io::Error::last_os_error());
   }
   Ok(fd)
}

/// Sender half of the control channel.
#[derive(Debug)]
pub struct MgmtSender {
   fd: OwnedFd,
}

impl Transport for MgmtSender {
   fn send(&mut self, frame: &[u8]) -> io::Result<()> {
      // SAFETY: the buffer outlives the call and len matches.
      let ret = unsafe {
         libc::write(
            self.fd.as_raw_fd(),
            frame.as_ptr().cast::<libc::c_void>(),
            frame.len(),
         )
      };
      if ret < 0 {
         return Err(io::Error::last_os_error());
      }
      if ret as usize != frame.len() {
         return Err(io::Error::new(
            io::ErrorKind::WriteZero,
            "short write on control socket",
         ));
      }
      Ok(())
   }
}

/// Receiver half of the control channel.
///
/// Provides async frame reception from the kernel.
#[derive(Debug)]
pub struct MgmtReceiver {
   fd: AsyncFd<OwnedFd>,
}

impl MgmtReceiver {
   /// Receives one whole datagram into `buf`.
   pub async fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
      loop {
         let mut guard = self.fd.readable_mut().await.map_err(MgmtError::Io)?;
         let read = guard.try_io(|inner| {
            // SAFETY: buf is valid for writes of buf.len() bytes.
            let ret = unsafe {
               libc::read(
                  inner.get_ref().as_raw_fd(),
                  buf.as_mut_ptr().cast::<libc::c_void>(),
                  buf.len(),
               )
            };
            if ret < 0 {
               Err(io::Error::last_os_error())
            } else {
               Ok(ret as usize)
            }
         });
         match read {
            Ok(Ok(0)) => return Err(MgmtError::SocketClosed),
            Ok(Ok(n)) => return Ok(n),
            Ok(Err(e)) => return Err(e.into()),
            Err(_would_block) => continue,
         }
      }
   }
}

/// The kernel control socket, split into its two halves.
pub struct MgmtSocket;

impl MgmtSocket {
   pub fn open() -> Result<(MgmtSender, MgmtReceiver)> {
      let recv_fd = open_control_socket()?;
      let send_fd = recv_fd.try_clone()?;
      debug!("Control socket open, fd {}", recv_fd.as_raw_fd());
      Ok((
         MgmtSender { fd: send_fd },
         MgmtReceiver {
            fd: AsyncFd::new(recv_fd)?,
         },
      ))
   }
}

/// One session on the control channel: the transport, the controller table,
/// and the host collaborators every event is reported to.
pub struct MgmtSession {
   pub(super) transport: Box<dyn Transport>,
   pub(super) controllers: ControllerRegistry,
   pub(super) adapters: Box<dyn AdapterManager + Send>,
   pub(super) devices: Box<dyn DeviceManager + Send>,
   pub(super) keys: Box<dyn KeyStore + Send>,
   pub(super) eir: Box<dyn EirDecoder + Send>,
   pub(super) config: Config,
   pub(super) version: Option<(u8, u16)>,
}

impl MgmtSession {
   pub fn new(
      transport: Box<dyn Transport>,
      adapters: Box<dyn AdapterManager + Send>,
      devices: Box<dyn DeviceManager + Send>,
      keys: Box<dyn KeyStore + Send>,
      config: Config,
   ) -> Self {
      Self {
         transport,
         controllers: ControllerRegistry::new(),
         adapters,
         devices,
         keys,
         eir: Box::new(BasicEirDecoder),
         config,
         version: None,
      }
   }

   pub fn set_eir_decoder(&mut self, eir: Box<dyn EirDecoder + Send>) {
      self.eir = eir;
   }

   /// Kernel protocol version and revision, once the handshake completed.
   pub fn version(&self) -> Option<(u8, u16)> {
      self.version
   }

   pub fn config(&self) -> &Config {
      &self.config
   }

   /// Opens the exchange: everything else flows from the version reply.
   pub fn start(&mut self) -> Result<()> {
      info!("Starting management session");
      self.send_command(MgmtOpcode::ReadVersion, INDEX_NONE, &[])
   }

   /// Tears the session down, reporting every known controller as gone.
   pub fn shutdown(&mut self) {
      info!("Shutting down management session");
      let indices: Vec<u16> = self.controllers.iter_valid().map(|(i, _)| i).collect();
      for index in indices {
         self.adapters.unregister_adapter(index);
      }
      self.controllers.clear();
      self.version = None;
   }
}

/// Feeds received frames into the session until the socket closes or a
/// fatal error ends the session.
pub async fn drive(session: &mut MgmtSession, rx: &mut MgmtReceiver) -> Result<()> {
   let mut buf = [0u8; MGMT_BUF_SIZE];
   loop {
      let n = rx.recv(&mut buf).await?;
      let frame = &buf[..n];
      debug!("← {}", hex::encode(frame));
      session.process_frame(frame)?;
   }
}
