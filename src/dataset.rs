use std::collections::BTreeMap;
use std::sync::Arc;

use crate::cpl::CslStringList;
use crate::errors::{GeolocError, Result};
use crate::metadata::Metadata;
use crate::raster::RasterBand;
use crate::spatial_ref::SpatialRef;
use crate::GeoTransform;

/// An in-memory raster dataset: bands of identical size plus georeferencing
/// and metadata.
#[derive(Debug, Clone)]
pub struct Dataset {
    description: String,
    size: (usize, usize),
    bands: Vec<RasterBand>,
    geo_transform: Option<GeoTransform>,
    spatial_ref: Option<SpatialRef>,
    metadata: BTreeMap<String, CslStringList>,
}

impl Dataset {
    /// Creates a dataset of `size` `(cols, rows)` without bands.
    pub fn new(description: &str, size: (usize, usize)) -> Self {
        Dataset {
            description: description.to_string(),
            size,
            bands: Vec::new(),
            geo_transform: None,
            spatial_ref: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Creates a dataset from its bands, which must all share the same size.
    pub fn from_bands(description: &str, bands: Vec<RasterBand>) -> Result<Self> {
        let size = bands.first().map(RasterBand::size).unwrap_or((0, 0));
        let mut dataset = Dataset::new(description, size);
        for band in bands {
            dataset.add_band(band)?;
        }
        Ok(dataset)
    }

    pub fn add_band(&mut self, band: RasterBand) -> Result<()> {
        if band.size() != self.size {
            return Err(GeolocError::BadArgument(format!(
                "band of size {:?} does not match dataset '{}' of size {:?}",
                band.size(),
                self.description,
                self.size
            )));
        }
        self.bands.push(band);
        Ok(())
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_description(&mut self, description: &str) {
        self.description = description.to_string();
    }

    /// `(cols, rows)`
    pub fn raster_size(&self) -> (usize, usize) {
        self.size
    }

    pub fn raster_count(&self) -> usize {
        self.bands.len()
    }

    /// Fetch a band object for a dataset, `band_index` starts at 1.
    pub fn rasterband(&self, band_index: usize) -> Result<&RasterBand> {
        band_index
            .checked_sub(1)
            .and_then(|idx| self.bands.get(idx))
            .ok_or_else(|| GeolocError::BandNotFound {
                dataset: self.description.clone(),
                band: band_index,
            })
    }

    pub fn rasterband_mut(&mut self, band_index: usize) -> Result<&mut RasterBand> {
        let dataset = self.description.clone();
        band_index
            .checked_sub(1)
            .and_then(|idx| self.bands.get_mut(idx))
            .ok_or(GeolocError::BandNotFound {
                dataset,
                band: band_index,
            })
    }

    pub fn geo_transform(&self) -> Option<GeoTransform> {
        self.geo_transform
    }

    pub fn set_geo_transform(&mut self, transformation: &GeoTransform) {
        self.geo_transform = Some(*transformation);
    }

    pub fn spatial_ref(&self) -> Option<&SpatialRef> {
        self.spatial_ref.as_ref()
    }

    pub fn set_spatial_ref(&mut self, spatial_ref: &SpatialRef) {
        self.spatial_ref = Some(spatial_ref.clone());
    }
}

impl Metadata for Dataset {
    fn metadata_domain(&self, domain: &str) -> Option<&CslStringList> {
        self.metadata.get(&domain.to_ascii_uppercase())
    }

    fn set_metadata_domain(&mut self, domain: &str, metadata: CslStringList) {
        self.metadata.insert(domain.to_ascii_uppercase(), metadata);
    }

    fn metadata_domains(&self) -> Vec<String> {
        self.metadata
            .iter()
            .filter(|(_, items)| !items.is_empty())
            .map(|(domain, _)| domain.clone())
            .collect()
    }
}

/// Opens the datasets referenced by name from geolocation metadata.
pub trait DatasetResolver: Send + Sync {
    fn open_shared(&self, name: &str) -> Result<Arc<Dataset>>;
}
