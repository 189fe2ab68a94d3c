#![no_main]

use libfuzzer_sys::fuzz_target;
use vigil_registry::RegistryExport;

fuzz_target!(|data: &[u8]| {
    // Untrusted export files must never panic the verifier
    if let Ok(export) = serde_json::from_slice::<RegistryExport>(data) {
        if let Ok(replayed) = export.verify() {
            assert_eq!(replayed.version(), Some(export.snapshot.version));
            assert_eq!(replayed.hash(), Some(export.snapshot.current_hash));
        }
    }
});
