//! Layering of remote values between local files and process variables.

use crate::secrets::LocalLayers;
use crate::snapshot::{ConfigSnapshot, SnapshotSource};
use std::collections::HashMap;

/// Merge remote values with the local layers.
///
/// Precedence, lowest to highest: `.env*` files, remote values, process
/// variables. Without a remote snapshot the result is local-only and marked
/// [`SnapshotSource::LocalFallback`]; otherwise it keeps the remote source.
pub fn merge(remote: Option<&ConfigSnapshot>, local: &LocalLayers) -> ConfigSnapshot {
    let mut values: HashMap<String, String> =
        HashMap::with_capacity(local.files.len() + local.process.len());

    values.extend(local.files.iter().map(|(k, v)| (k.clone(), v.clone())));
    if let Some(remote) = remote {
        values.extend(remote.values().iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    values.extend(local.process.iter().map(|(k, v)| (k.clone(), v.clone())));

    let source = remote.map_or(SnapshotSource::LocalFallback, ConfigSnapshot::source);
    ConfigSnapshot::new(values, source)
}
