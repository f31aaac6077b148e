use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::headers::ObjectMeta;

/// One entry of an SLO manifest (or a manifest synthesized from an MPU /
/// oversized-object split).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub name: String,
    pub bytes: u64,
    pub hash: String,
}

/// Which large-object shape a remote object turned out to be, as detected
/// from its response headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LargeObjectKind {
    Dlo,
    Slo,
    MultipartUpload,
    Oversized,
    Plain,
}

/// Inspects a fetched object's metadata and classifies it.
pub fn classify(meta: &ObjectMeta, max_file_size: u64) -> LargeObjectKind {
    if meta.dlo_manifest_prefix().is_some() {
        LargeObjectKind::Dlo
    } else if meta.is_static_large_object() {
        LargeObjectKind::Slo
    } else if meta.is_multipart_etag() {
        LargeObjectKind::MultipartUpload
    } else if meta.content_length > max_file_size {
        LargeObjectKind::Oversized
    } else {
        LargeObjectKind::Plain
    }
}

/// Computes the SLO/MPU manifest etag law: hex(md5(concat(raw md5 of each
/// segment's etag))). Segment etags are themselves hex strings; each is
/// decoded back to its 16 raw bytes before concatenation, matching how the
/// object store itself derives a multipart etag from its parts' MD5s.
pub fn get_slo_etag(segments: &[Segment]) -> Result<String> {
    let mut concatenated = Vec::with_capacity(segments.len() * 16);
    for seg in segments {
        let part_etag = seg.hash.split('-').next().unwrap_or(&seg.hash);
        let raw = hex::decode(part_etag)
            .map_err(|e| Error::Generic(format!("segment etag '{part_etag}' is not hex: {e}")))?;
        concatenated.extend_from_slice(&raw);
    }
    Ok(format!("{:x}", md5::compute(&concatenated)))
}

/// Builds the destination segment name for one part of an MPU or
/// size-split object: `<key>/<x-ts>/<total-size>/<part-size>/<NNNNNNNN>`,
/// stored under the `<container>_segments` container.
pub fn segment_name(key: &str, x_timestamp: &str, total_size: u64, part_size: u64, part_index: u32) -> String {
    format!("{key}/{x_timestamp}/{total_size}/{part_size}/{part_index:08}")
}

pub fn segments_container(container: &str) -> String {
    format!("{container}_segments")
}

/// Splits a byte length into `(part_size, part_count)` chunks no larger than
/// `segment_size`.
pub fn plan_segments(total_size: u64, segment_size: u64) -> Vec<(u64, u64)> {
    if total_size == 0 {
        return Vec::new();
    }
    let mut remaining = total_size;
    let mut offset = 0u64;
    let mut plan = Vec::new();
    while remaining > 0 {
        let this_size = remaining.min(segment_size);
        plan.push((offset, this_size));
        offset += this_size;
        remaining -= this_size;
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(hash: &str) -> Segment {
        Segment {
            name: "x".into(),
            bytes: 1,
            hash: hash.into(),
        }
    }

    #[test]
    fn slo_etag_matches_manual_concatenation() {
        let p1 = format!("{:x}", md5::compute(b"part-one"));
        let p2 = format!("{:x}", md5::compute(b"part-two"));
        let segments = vec![seg(&p1), seg(&p2)];

        let expected = {
            let mut buf = Vec::new();
            buf.extend_from_slice(&md5::compute(b"part-one").0);
            buf.extend_from_slice(&md5::compute(b"part-two").0);
            format!("{:x}", md5::compute(&buf))
        };

        assert_eq!(get_slo_etag(&segments).unwrap(), expected);
    }

    #[test]
    fn plan_segments_covers_total_size_exactly() {
        let plan = plan_segments(250, 100);
        assert_eq!(plan, vec![(0, 100), (100, 100), (200, 50)]);
    }

    #[test]
    fn plan_segments_empty_for_zero_length() {
        assert!(plan_segments(0, 100).is_empty());
    }

    #[test]
    fn segment_name_has_fixed_width_index() {
        let name = segment_name("key", "100.000000_00000000", 300, 100, 2);
        assert_eq!(name, "key/100.000000_00000000/300/100/00000002");
    }
}
