// Gap limit + derivation tracker for HD accounts

use std::collections::{btree_map, BTreeMap, HashMap};

use bdk_wallet::miniscript::{Descriptor, DescriptorPublicKey};
use bdk_wallet::KeychainKind;
use bitcoin::hashes::{sha256, Hash};
use bitcoin::ScriptBuf;

use crate::tx::UnspentOutput;

/// Tracks derived scripts for an account's external and internal descriptors.
///
/// Keeps a window of `lookahead` unused scripts beyond the highest used index
/// of each keychain, and maps Electrum script hashes back to
/// `(keychain, index)` so incoming outputs can be attributed.
#[derive(Debug, Clone)]
pub struct DerivedKeychain {
    lookahead: u32,
    descriptors: BTreeMap<KeychainKind, Descriptor<DescriptorPublicKey>>,
    /// (keychain, index) -> (script hash, script)
    derived: BTreeMap<(KeychainKind, u32), (sha256::Hash, ScriptBuf)>,
    /// script hash -> (keychain, index)
    derived_rev: HashMap<sha256::Hash, (KeychainKind, u32)>,
    /// Highest used index per keychain.
    last_used: BTreeMap<KeychainKind, u32>,
}

impl DerivedKeychain {
    pub fn new(lookahead: u32) -> Self {
        Self {
            lookahead,
            descriptors: BTreeMap::new(),
            derived: BTreeMap::new(),
            derived_rev: HashMap::new(),
            last_used: BTreeMap::new(),
        }
    }

    /// Builds a tracker for an external/internal descriptor pair.
    pub fn from_descriptors(
        external: Descriptor<DescriptorPublicKey>,
        internal: Descriptor<DescriptorPublicKey>,
        lookahead: u32,
    ) -> Self {
        let mut keychain = Self::new(lookahead);
        keychain.insert_descriptor(KeychainKind::External, external);
        keychain.insert_descriptor(KeychainKind::Internal, internal);
        keychain
    }

    /// Registers or replaces the descriptor for `keychain` and derives
    /// `[0 ..= lookahead]`. Returns the newly derived scripts.
    pub fn insert_descriptor(
        &mut self,
        keychain: KeychainKind,
        descriptor: Descriptor<DescriptorPublicKey>,
    ) -> Vec<(sha256::Hash, ScriptBuf)> {
        log::debug!("[KEYCHAIN] {:?}: {}", keychain, descriptor);
        if let Some(old) = self.descriptors.insert(keychain, descriptor.clone()) {
            if old == descriptor {
                return vec![];
            }
            self.clear_keychain(keychain);
        }

        (0..=self.lookahead)
            .filter_map(|i| self.add_derived_spk(keychain, i))
            .collect()
    }

    pub fn all_spks(&self) -> impl Iterator<Item = &(sha256::Hash, ScriptBuf)> {
        self.derived.values()
    }

    pub fn index_of_spk_hash(&self, hash: &sha256::Hash) -> Option<(KeychainKind, u32)> {
        self.derived_rev.get(hash).copied()
    }

    pub fn index_of_script(&self, script: &ScriptBuf) -> Option<(KeychainKind, u32)> {
        self.index_of_spk_hash(&sha256::Hash::hash(script.as_bytes()))
    }

    pub fn is_mine(&self, script: &ScriptBuf) -> bool {
        self.index_of_script(script).is_some()
    }

    /// Records that `index` received funds and extends the window past it.
    /// Returns scripts derived as a result.
    pub fn mark_used_and_derive_new(
        &mut self,
        keychain: KeychainKind,
        index: u32,
    ) -> Vec<(sha256::Hash, ScriptBuf)> {
        let used = self.last_used.entry(keychain).or_insert(index);
        if index > *used {
            *used = index;
        }

        let next_index = index + 1;
        let mut newly_derived = Vec::new();
        for i in next_index..=next_index + self.lookahead {
            if let Some(pair) = self.add_derived_spk(keychain, i) {
                newly_derived.push(pair);
            }
        }
        newly_derived
    }

    /// Marks `script` used if it belongs to this keychain. Returns whether
    /// it did.
    pub fn mark_script_used(&mut self, script: &ScriptBuf) -> bool {
        match self.index_of_script(script) {
            Some((keychain, index)) => {
                self.mark_used_and_derive_new(keychain, index);
                true
            }
            None => false,
        }
    }

    /// Marks the scripts of `outputs` that belong to this keychain as used.
    /// Returns how many scripts were newly derived.
    pub fn mark_outputs_used(&mut self, outputs: &[UnspentOutput]) -> usize {
        let mut derived = 0;
        for utxo in outputs {
            // A spent output never shows up here; its script was already
            // marked when the transaction paying to it was queued.
            if let Some((keychain, index)) = self.index_of_script(&utxo.script_pubkey) {
                derived += self.mark_used_and_derive_new(keychain, index).len();
            }
        }
        derived
    }

    /// First index after the highest used one.
    pub fn next_unused_index(&self, keychain: KeychainKind) -> u32 {
        self.last_used.get(&keychain).map(|i| i + 1).unwrap_or(0)
    }

    /// Script at the next unused index, derived on demand.
    pub fn next_unused_script(&mut self, keychain: KeychainKind) -> Option<ScriptBuf> {
        let index = self.next_unused_index(keychain);
        self.add_derived_spk(keychain, index);
        self.derived.get(&(keychain, index)).map(|(_, spk)| spk.clone())
    }

    /// Derives and stores one script. `None` if already tracked or the
    /// descriptor cannot derive at `index`.
    fn add_derived_spk(
        &mut self,
        keychain: KeychainKind,
        index: u32,
    ) -> Option<(sha256::Hash, ScriptBuf)> {
        if let btree_map::Entry::Vacant(entry) = self.derived.entry((keychain, index)) {
            let descriptor = self.descriptors.get(&keychain)?;
            let spk = match descriptor.at_derivation_index(index) {
                Ok(definite) => definite.script_pubkey(),
                Err(e) => {
                    log::error!("[KEYCHAIN] cannot derive {:?}/{}: {}", keychain, index, e);
                    return None;
                }
            };
            let hash = sha256::Hash::hash(spk.as_bytes());

            entry.insert((hash, spk.clone()));
            self.derived_rev.insert(hash, (keychain, index));
            return Some((hash, spk));
        }
        None
    }

    fn clear_keychain(&mut self, keychain: KeychainKind) {
        self.derived.retain(|(kc, _), _| *kc != keychain);
        self.derived_rev.retain(|_, (kc, _)| *kc != keychain);
        self.last_used.remove(&keychain);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn descriptor(branch: u32) -> Descriptor<DescriptorPublicKey> {
        Descriptor::from_str(&format!(
            "wpkh([73c5da0a/84h/1h/0h]tpubDC8msFGeGuwnKG9Upg7DM2b4DaRqg3CUZa5g8v2SRQ6K4NSkxUgd7HsL2XVWbVm39yBA4LAxysQAm397zwQSQoQgewGiYZqrA9DsP4zbQ1M/{}/*)",
            branch
        ))
        .unwrap()
    }

    fn keychain(lookahead: u32) -> DerivedKeychain {
        DerivedKeychain::from_descriptors(descriptor(0), descriptor(1), lookahead)
    }

    #[test]
    fn derives_initial_window_for_both_keychains() {
        let kc = keychain(2);
        // [0..=2] on each side
        assert_eq!(kc.all_spks().count(), 6);
    }

    #[test]
    fn reinserting_same_descriptor_is_noop() {
        let mut kc = keychain(2);
        assert!(kc.insert_descriptor(KeychainKind::External, descriptor(0)).is_empty());
    }

    #[test]
    fn reverse_lookup_finds_keychain() {
        let mut kc = keychain(2);
        let change = kc.next_unused_script(KeychainKind::Internal).unwrap();
        assert_eq!(kc.index_of_script(&change), Some((KeychainKind::Internal, 0)));
        assert!(kc.is_mine(&change));
        assert!(!kc.is_mine(&ScriptBuf::new()));
    }

    #[test]
    fn change_moves_past_used_index() {
        let mut kc = keychain(2);
        let first = kc.next_unused_script(KeychainKind::Internal).unwrap();

        kc.mark_used_and_derive_new(KeychainKind::Internal, 0);
        let second = kc.next_unused_script(KeychainKind::Internal).unwrap();

        assert_ne!(first, second);
        assert_eq!(kc.index_of_script(&second), Some((KeychainKind::Internal, 1)));
    }

    #[test]
    fn marking_used_extends_window() {
        let mut kc = keychain(2);
        let before = kc.all_spks().count();

        let new = kc.mark_used_and_derive_new(KeychainKind::External, 2);
        // window becomes [0..=5] on the external side
        assert_eq!(new.len(), 3);
        assert_eq!(kc.all_spks().count(), before + 3);

        // Lower index does not move the high-water mark back.
        kc.mark_used_and_derive_new(KeychainKind::External, 1);
        assert_eq!(kc.next_unused_index(KeychainKind::External), 3);
    }

    #[test]
    fn funded_outputs_advance_change() {
        let mut kc = keychain(2);
        let change = kc.next_unused_script(KeychainKind::Internal).unwrap();
        let funded = UnspentOutput {
            outpoint: bitcoin::OutPoint::null(),
            value: bitcoin::Amount::from_sat(10_000),
            confirmations: 1,
            script_pubkey: change.clone(),
        };
        let foreign = UnspentOutput {
            script_pubkey: ScriptBuf::new(),
            ..funded.clone()
        };

        // index 0 used: window grows to [0..=3]
        assert_eq!(kc.mark_outputs_used(&[funded, foreign]), 1);
        assert_ne!(kc.next_unused_script(KeychainKind::Internal).unwrap(), change);
    }

    #[test]
    fn marking_queued_change_script() {
        let mut kc = keychain(2);
        let change = kc.next_unused_script(KeychainKind::Internal).unwrap();

        assert!(kc.mark_script_used(&change));
        assert!(!kc.mark_script_used(&ScriptBuf::new()));
        assert_eq!(kc.next_unused_index(KeychainKind::Internal), 1);
    }

    #[test]
    fn replacing_descriptor_clears_old_scripts() {
        let mut kc = keychain(1);
        let old = kc.next_unused_script(KeychainKind::External).unwrap();

        kc.insert_descriptor(KeychainKind::External, descriptor(5));
        assert!(!kc.is_mine(&old));
        assert_eq!(kc.all_spks().count(), 4);
    }
}
