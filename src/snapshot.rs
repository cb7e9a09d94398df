//! Saving and loading region images.
//!
//! An image is the region's bytes, `capacity` long, in the record layout of
//! [`crate::record_layout`] with native byte order. Saving copies records
//! through the same acquire protocol the reader uses, so a live region can be
//! saved while writers keep recording: the image holds every record published
//! at the time it was visited, and zeros after the last one.

use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::log_reader::PublishedRecords;
use crate::record_layout::{
    ENCODED_BYTES_OFFSET, ENCODED_LENGTH_OFFSET, FIRST_OBSERVATION_TIMESTAMP_OFFSET,
    LAST_OBSERVATION_TIMESTAMP_OFFSET, OBSERVATION_COUNT_OFFSET,
};
use crate::shared_region::{RegionError, SharedRegion};

/// Builds an image of the published records in `region`.
pub fn image(region: &SharedRegion) -> Vec<u8> {
    let mut image = vec![0u8; region.capacity()];
    let mut records = 0usize;

    for record in PublishedRecords::new(region) {
        let at = record.offset;
        put(&mut image, at + OBSERVATION_COUNT_OFFSET, &record.observation_count(region).to_ne_bytes());
        put(
            &mut image,
            at + FIRST_OBSERVATION_TIMESTAMP_OFFSET,
            &record.first_observation_timestamp(region).to_ne_bytes(),
        );
        put(
            &mut image,
            at + LAST_OBSERVATION_TIMESTAMP_OFFSET,
            &record.last_observation_timestamp(region).to_ne_bytes(),
        );
        put(&mut image, at + ENCODED_BYTES_OFFSET, record.encoded_bytes(region));
        put(
            &mut image,
            at + ENCODED_LENGTH_OFFSET,
            &(record.encoded_length as u32).to_ne_bytes(),
        );
        records += 1;
    }

    debug!(records, capacity = region.capacity(), "built region image");
    image
}

/// Writes an image of `region` to `path`, replacing any existing file.
///
/// The image is written to a temporary file next to `path` and renamed over
/// it, so readers of `path` never see a partial image.
pub fn save(region: &SharedRegion, path: impl AsRef<Path>) -> Result<(), RegionError> {
    let path = path.as_ref();
    let image = image(region);

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(&image)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|err| RegionError::Io(err.error))?;

    info!(path = %path.display(), bytes = image.len(), "saved exception log image");
    Ok(())
}

/// Loads an image saved by [`save`] into a new region of the same capacity.
pub fn load(path: impl AsRef<Path>) -> Result<SharedRegion, RegionError> {
    let path = path.as_ref();
    let bytes = fs::read(path)?;
    let region = SharedRegion::from_bytes(&bytes)?;
    info!(path = %path.display(), bytes = bytes.len(), "loaded exception log image");
    Ok(region)
}

#[inline]
fn put(image: &mut [u8], offset: usize, bytes: &[u8]) {
    image[offset..offset + bytes.len()].copy_from_slice(bytes);
}
