//! In-process registry of named datasets, addressed with `/vsimem/` paths.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;

use crate::dataset::{Dataset, DatasetResolver};
use crate::errors::{GeolocError, Result};

const MEM_PREFIX: &str = "/vsimem/";

static MEM_DATASETS: Lazy<RwLock<HashMap<String, Arc<Dataset>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

fn check_mem_name(name: &str) -> Result<()> {
    if name.len() <= MEM_PREFIX.len() || !name.starts_with(MEM_PREFIX) {
        return Err(GeolocError::BadArgument(format!(
            "in-memory dataset names must start with {MEM_PREFIX}: '{name}'"
        )));
    }
    Ok(())
}

/// Registers `dataset` under `name`, replacing any previous dataset of that name.
///
/// The dataset description is set to `name`.
pub fn register_mem_dataset(name: &str, mut dataset: Dataset) -> Result<Arc<Dataset>> {
    check_mem_name(name)?;
    dataset.set_description(name);
    let dataset = Arc::new(dataset);
    MEM_DATASETS
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .insert(name.to_string(), dataset.clone());
    Ok(dataset)
}

/// Opens a previously registered dataset.
pub fn open_mem_dataset(name: &str) -> Result<Arc<Dataset>> {
    MEM_DATASETS
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .get(name)
        .cloned()
        .ok_or_else(|| GeolocError::DatasetNotFound(name.to_string()))
}

/// Unlinks a registered dataset; handles already opened stay valid.
pub fn unlink_mem_dataset(name: &str) -> Result<()> {
    MEM_DATASETS
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .remove(name)
        .map(|_| ())
        .ok_or_else(|| GeolocError::DatasetNotFound(name.to_string()))
}

/// Names of the registered datasets, sorted.
pub fn read_mem_dir() -> Vec<String> {
    let mut names: Vec<String> = MEM_DATASETS
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .keys()
        .cloned()
        .collect();
    names.sort();
    names
}

/// Resolves dataset names against the `/vsimem/` registry.
#[derive(Debug, Default, Clone, Copy)]
pub struct MemResolver;

impl DatasetResolver for MemResolver {
    fn open_shared(&self, name: &str) -> Result<Arc<Dataset>> {
        open_mem_dataset(name)
    }
}
