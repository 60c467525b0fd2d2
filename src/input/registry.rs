//! # Device Registry
//!
//! Assigns `joyN` keys to connected devices and keeps them stable across
//! hot-plug.
//!
//! A device is identified by a stable identifier (evdev unique name, physical
//! path, ...), not by enumeration order. When a device is unplugged and plugged
//! back in, it gets its previous key again as long as nobody else took it in
//! the meantime. New devices take the lowest free key.
//!
//! ```
//! use trainer_bridge::input::DeviceRegistry;
//!
//! let mut registry = DeviceRegistry::new();
//! let a = registry.insert("usb-1", "stick");
//! let b = registry.insert("usb-2", "throttle");
//! assert_eq!((a.as_str(), b.as_str()), ("joy0", "joy1"));
//!
//! registry.remove("usb-1");
//! registry.remove("usb-2");
//!
//! // Plugged back in reverse order: keys do not drift
//! assert_eq!(registry.insert("usb-2", "throttle"), "joy1");
//! assert_eq!(registry.insert("usb-1", "stick"), "joy0");
//! ```

use std::collections::{BTreeMap, HashMap};

/// Prefix of generated device keys.
pub const DEVICE_KEY_PREFIX: &str = "joy";

#[derive(Debug)]
struct Slot<T> {
    stable_id: String,
    device: T,
}

/// Connected devices indexed by slot number, with remembered slot assignments.
#[derive(Debug)]
pub struct DeviceRegistry<T> {
    slots: BTreeMap<usize, Slot<T>>,
    remembered: HashMap<String, usize>,
}

impl<T> Default for DeviceRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DeviceRegistry<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: BTreeMap::new(),
            remembered: HashMap::new(),
        }
    }

    /// Formats the key for a slot number.
    #[must_use]
    pub fn key_for(slot: usize) -> String {
        format!("{DEVICE_KEY_PREFIX}{slot}")
    }

    fn slot_for(key: &str) -> Option<usize> {
        key.strip_prefix(DEVICE_KEY_PREFIX)?.parse().ok()
    }

    /// Registers a device and returns its key.
    ///
    /// Re-inserting an identifier that is already connected replaces the device
    /// and keeps the key.
    pub fn insert(&mut self, stable_id: &str, device: T) -> String {
        if let Some(slot) = self.slot_of(stable_id) {
            if let Some(entry) = self.slots.get_mut(&slot) {
                entry.device = device;
            }
            return Self::key_for(slot);
        }

        let slot = match self.remembered.get(stable_id) {
            Some(&slot) if !self.slots.contains_key(&slot) => slot,
            _ => self.lowest_free_slot(),
        };

        self.slots.insert(
            slot,
            Slot {
                stable_id: stable_id.to_string(),
                device,
            },
        );
        self.remembered.insert(stable_id.to_string(), slot);
        Self::key_for(slot)
    }

    /// Unregisters a device by identifier, returning its key and handle.
    pub fn remove(&mut self, stable_id: &str) -> Option<(String, T)> {
        let slot = self.slot_of(stable_id)?;
        self.slots
            .remove(&slot)
            .map(|entry| (Self::key_for(slot), entry.device))
    }

    /// Unregisters a device by key.
    pub fn remove_key(&mut self, key: &str) -> Option<T> {
        let slot = Self::slot_for(key)?;
        self.slots.remove(&slot).map(|entry| entry.device)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&T> {
        let slot = Self::slot_for(key)?;
        self.slots.get(&slot).map(|entry| &entry.device)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut T> {
        let slot = Self::slot_for(key)?;
        self.slots.get_mut(&slot).map(|entry| &mut entry.device)
    }

    #[must_use]
    pub fn contains_id(&self, stable_id: &str) -> bool {
        self.slot_of(stable_id).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Iterates connected devices as `(key, device)` in key order.
    pub fn iter(&self) -> impl Iterator<Item = (String, &T)> + '_ {
        self.slots
            .iter()
            .map(|(&slot, entry)| (Self::key_for(slot), &entry.device))
    }

    /// Iterates connected devices mutably as `(key, device)` in key order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (String, &mut T)> + '_ {
        self.slots
            .iter_mut()
            .map(|(&slot, entry)| (Self::key_for(slot), &mut entry.device))
    }

    fn slot_of(&self, stable_id: &str) -> Option<usize> {
        self.slots
            .iter()
            .find(|(_, entry)| entry.stable_id == stable_id)
            .map(|(&slot, _)| slot)
    }

    fn lowest_free_slot(&self) -> usize {
        (0..).find(|slot| !self.slots.contains_key(slot)).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_assigned_in_order() {
        let mut registry = DeviceRegistry::new();
        assert_eq!(registry.insert("a", 1), "joy0");
        assert_eq!(registry.insert("b", 2), "joy1");
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("joy1"), Some(&2));
    }

    #[test]
    fn test_removal_frees_slot() {
        let mut registry = DeviceRegistry::new();
        registry.insert("a", 1);
        registry.insert("b", 2);

        assert_eq!(registry.remove("a"), Some(("joy0".to_string(), 1)));
        assert!(registry.get("joy0").is_none());
        assert_eq!(registry.get("joy1"), Some(&2));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_readded_device_keeps_key() {
        let mut registry = DeviceRegistry::new();
        registry.insert("a", 1);
        registry.insert("b", 2);
        registry.remove("a");
        registry.remove("b");

        assert_eq!(registry.insert("b", 2), "joy1");
        assert_eq!(registry.insert("a", 1), "joy0");
    }

    #[test]
    fn test_new_device_takes_lowest_free_slot() {
        let mut registry = DeviceRegistry::new();
        registry.insert("a", 1);
        registry.insert("b", 2);
        registry.remove("a");

        assert_eq!(registry.insert("c", 3), "joy0");

        // "a" returns while its old key is taken
        assert_eq!(registry.insert("a", 1), "joy2");
    }

    #[test]
    fn test_reinsert_connected_id_replaces_device() {
        let mut registry = DeviceRegistry::new();
        registry.insert("a", 1);
        assert_eq!(registry.insert("a", 5), "joy0");
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("joy0"), Some(&5));
    }

    #[test]
    fn test_remove_key() {
        let mut registry = DeviceRegistry::new();
        registry.insert("a", 1);
        assert_eq!(registry.remove_key("joy0"), Some(1));
        assert_eq!(registry.remove_key("joy0"), None);
        assert_eq!(registry.remove_key("pad0"), None);
        assert!(registry.is_empty());
        assert!(!registry.contains_id("a"));
    }

    #[test]
    fn test_iter_in_key_order() {
        let mut registry = DeviceRegistry::new();
        registry.insert("x", 'x');
        registry.insert("y", 'y');
        let keys: Vec<_> = registry.iter().map(|(key, _)| key).collect();
        assert_eq!(keys, vec!["joy0", "joy1"]);
    }

    #[test]
    fn test_unknown_keys() {
        let registry: DeviceRegistry<u8> = DeviceRegistry::new();
        assert!(registry.get("joy").is_none());
        assert!(registry.get("joyX").is_none());
        assert!(registry.get("").is_none());
    }
}
