//! Configuration for the management engine.
//!
//! This module handles loading and saving configuration from disk,
//! covering pairing defaults and the identity advertised over Device ID.

use std::{
   env, fs,
   path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::{MgmtError, Result};

/// Main configuration structure for the engine.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Config {
   /// IO capability advertised for pairing: 0 DisplayOnly, 1 DisplayYesNo,
   /// 2 KeyboardOnly, 3 NoInputNoOutput.
   #[serde(default = "default_io_capability")]
   pub io_capability: u8,

   /// Seconds a discoverable window stays open; 0 means indefinitely.
   #[serde(default = "default_discoverable_timeout")]
   pub discoverable_timeout: u16,

   /// Hand debug link keys to the kernel when loading stored keys.
   #[serde(default)]
   pub debug_keys: bool,

   /// Device ID record pushed to every controller, when set.
   #[serde(default)]
   pub device_id: Option<DeviceId>,
}

/// The Device ID profile identity.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceId {
   /// 1 = Bluetooth SIG, 2 = USB Implementers Forum.
   pub source: u16,
   pub vendor: u16,
   pub product: u16,
   pub version: u16,
}

const fn default_io_capability() -> u8 {
   0x01
}

const fn default_discoverable_timeout() -> u16 {
   0
}

impl Default for Config {
   fn default() -> Self {
      Self {
         io_capability: default_io_capability(),
         discoverable_timeout: default_discoverable_timeout(),
         debug_keys: false,
         device_id: None,
      }
   }
}

impl Config {
   /// Loads configuration from disk or creates default if not exists.
   pub fn load() -> Result<Self> {
      let config_path = Self::config_path()?;

      if config_path.exists() {
         Self::load_from(&config_path)
      } else {
         let config = Self::default();
         config.save_to(&config_path)?;
         Ok(config)
      }
   }

   /// Saves the current configuration to disk.
   pub fn save(&self) -> Result<()> {
      self.save_to(&Self::config_path()?)
   }

   fn load_from(path: &Path) -> Result<Self> {
      let contents = fs::read_to_string(path)?;
      Ok(toml::from_str(&contents)?)
   }

   fn save_to(&self, path: &Path) -> Result<()> {
      if let Some(parent) = path.parent() {
         fs::create_dir_all(parent)?;
      }
      let contents = toml::to_string_pretty(self)?;
      fs::write(path, contents)?;
      Ok(())
   }

   fn config_path() -> Result<PathBuf> {
      let config_dir = if let Ok(btmgmt_home) = env::var("BTMGMT_HOME") {
         PathBuf::from(btmgmt_home)
      } else if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
         PathBuf::from(config_home)
      } else if let Ok(home) = env::var("HOME") {
         PathBuf::from(home).join(".config")
      } else {
         return Err(MgmtError::ConfigDirNotFound);
      };

      Ok(config_dir.join("btmgmt").join("config.toml"))
   }
}
