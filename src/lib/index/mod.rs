//! Deserialized SBWT and color-index containers and their opaque kernels.
//!
//! The pipeline treats both kernels as black boxes with fixed signatures:
//! `search` maps (packed bits, k-mer positions) to one column index or
//! not-found sentinel per position, and `color_lookup` maps warp-packed
//! column indexes to per-color hit counts per sequence. The containers also
//! carry the metadata the planner and printers need (`kmer_size`,
//! `max_index`, `num_colors`).
//!
//! On-disk container files use the same little-endian, length-prefixed
//! header convention as the result streams.

use byteorder::{LittleEndian, ReadBytesExt};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::errors::{Result, SbwtqError};
use crate::formats::{NOT_FOUND, PAD};
use crate::gpu::{DeviceBuffer, GpuStream, WARP_SIZE};
use crate::headers;

const SBWT_FORMAT_NAME: &str = "sbwtq-sbwt";
const COLORS_FORMAT_NAME: &str = "sbwtq-colors";

/// A deserialized SBWT index supporting k-mer membership lookups.
///
/// The column order is the lexicographic rank of the k-mer code, so
/// `max_index` is the largest value `search` can produce.
pub struct SbwtContainer {
    kmer_size: u64,
    /// Sorted 2-bit k-mer codes, one per SBWT column.
    kmer_codes: Vec<u64>,
}

impl SbwtContainer {
    /// Build a container from unsorted k-mer codes (used by tests and tools).
    #[must_use]
    pub fn from_codes(kmer_size: u64, mut kmer_codes: Vec<u64>) -> Self {
        kmer_codes.sort_unstable();
        kmer_codes.dedup();
        Self { kmer_size, kmer_codes }
    }

    /// Deserialize a container written by the index builder.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| SbwtqError::io(path, e))?;
        let mut reader = BufReader::new(file);
        let format = headers::read_string(&mut reader, path, 0)?;
        if format != SBWT_FORMAT_NAME {
            return Err(SbwtqError::format(path, 0, format!("Not an SBWT index file: {format}")));
        }
        let version = headers::read_string(&mut reader, path, headers::encoded_len(&format))?;
        if version != headers::HEADER_VERSION {
            return Err(SbwtqError::format(
                path,
                0,
                "The file has an incompatible version number",
            ));
        }
        let io = |e| SbwtqError::io(path, e);
        let kmer_size = reader.read_u64::<LittleEndian>().map_err(io)?;
        if kmer_size == 0 || kmer_size > 32 {
            return Err(SbwtqError::format(
                path,
                0,
                format!("Unsupported k-mer size: {kmer_size}"),
            ));
        }
        let num_kmers = reader.read_u64::<LittleEndian>().map_err(io)? as usize;
        let mut kmer_codes = vec![0_u64; num_kmers];
        reader.read_u64_into::<LittleEndian>(&mut kmer_codes).map_err(io)?;
        if !kmer_codes.is_sorted() {
            return Err(SbwtqError::format(path, 0, "Index k-mer table is not sorted"));
        }
        Ok(Self { kmer_size, kmer_codes })
    }

    #[must_use]
    pub fn kmer_size(&self) -> u64 {
        self.kmer_size
    }

    /// Largest column index `search` can produce.
    #[must_use]
    pub fn max_index(&self) -> u64 {
        self.kmer_codes.len().saturating_sub(1) as u64
    }

    /// The opaque search kernel: one result per k-mer position.
    ///
    /// Issued on `stream`; on the host backend it runs to completion before
    /// returning. Positions index characters, not words.
    pub fn launch_search(
        &self,
        stream: &GpuStream,
        d_bits: &DeviceBuffer<u64>,
        d_positions: &DeviceBuffer<u64>,
        d_results: &mut DeviceBuffer<u64>,
        num_queries: usize,
    ) -> Result<()> {
        let _ = stream;
        if num_queries > d_positions.len() || num_queries > d_results.len() {
            return Err(SbwtqError::Gpu(format!(
                "search launch with {num_queries} queries exceeds device buffers"
            )));
        }
        let bits = d_bits.as_slice();
        let positions = d_positions.as_slice();
        let results = d_results.as_mut_slice();
        for query in 0..num_queries {
            let code = extract_kmer_code(bits, positions[query], self.kmer_size);
            results[query] = match self.kmer_codes.binary_search(&code) {
                Ok(rank) => rank as u64,
                Err(_) => NOT_FOUND,
            };
        }
        Ok(())
    }
}

/// Extract the 2-bit code of the k-mer starting at character `position`.
fn extract_kmer_code(bits: &[u64], position: u64, kmer_size: u64) -> u64 {
    let mut code = 0_u64;
    for offset in position..position + kmer_size {
        let word = bits[(offset / 32) as usize];
        let shift = 62 - 2 * (offset % 32);
        code = (code << 2) | ((word >> shift) & 3);
    }
    code
}

/// A deserialized color index: one sorted color set per SBWT column, stored
/// in compressed sparse rows.
pub struct ColorIndexContainer {
    num_colors: u64,
    /// `set_offsets[i]..set_offsets[i + 1]` indexes `color_ids` for column i.
    set_offsets: Vec<u64>,
    color_ids: Vec<u64>,
}

impl ColorIndexContainer {
    /// Build a container from one color list per column (tests and tools).
    #[must_use]
    pub fn from_sets(num_colors: u64, sets: &[Vec<u64>]) -> Self {
        let mut set_offsets = Vec::with_capacity(sets.len() + 1);
        let mut color_ids = Vec::new();
        set_offsets.push(0);
        for set in sets {
            color_ids.extend_from_slice(set);
            set_offsets.push(color_ids.len() as u64);
        }
        Self { num_colors, set_offsets, color_ids }
    }

    /// Deserialize a container written by the color-index builder.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| SbwtqError::io(path, e))?;
        let mut reader = BufReader::new(file);
        let format = headers::read_string(&mut reader, path, 0)?;
        if format != COLORS_FORMAT_NAME {
            return Err(SbwtqError::format(path, 0, format!("Not a color index file: {format}")));
        }
        let version = headers::read_string(&mut reader, path, headers::encoded_len(&format))?;
        if version != headers::HEADER_VERSION {
            return Err(SbwtqError::format(
                path,
                0,
                "The file has an incompatible version number",
            ));
        }
        let io = |e| SbwtqError::io(path, e);
        let num_colors = reader.read_u64::<LittleEndian>().map_err(io)?;
        let num_sets = reader.read_u64::<LittleEndian>().map_err(io)? as usize;
        let mut set_offsets = vec![0_u64; num_sets + 1];
        reader.read_u64_into::<LittleEndian>(&mut set_offsets).map_err(io)?;
        let total = *set_offsets.last().unwrap_or(&0) as usize;
        let mut color_ids = vec![0_u64; total];
        reader.read_u64_into::<LittleEndian>(&mut color_ids).map_err(io)?;
        Ok(Self { num_colors, set_offsets, color_ids })
    }

    #[must_use]
    pub fn num_colors(&self) -> u64 {
        self.num_colors
    }

    /// Number of columns with a color set; the matching SBWT's `max_index`
    /// when the two were built together.
    #[must_use]
    pub fn max_index(&self) -> u64 {
        self.set_offsets.len().saturating_sub(2) as u64
    }

    /// The opaque color kernel: accumulate per-color hit counts per
    /// sequence from warp-packed column indexes.
    ///
    /// `warps_intervals` holds the cumulative warp count before each
    /// sequence (leading 0 included); results are `num_colors` counts per
    /// sequence, flattened.
    pub fn launch_color(
        &self,
        stream: &GpuStream,
        d_indexes: &DeviceBuffer<u64>,
        warps_intervals: &[u64],
        d_results: &mut DeviceBuffer<u64>,
        num_seqs: usize,
    ) -> Result<()> {
        let _ = stream;
        let num_colors = self.num_colors as usize;
        if num_seqs.saturating_mul(num_colors) > d_results.len() {
            return Err(SbwtqError::Gpu(format!(
                "color launch with {num_seqs} sequences exceeds device buffers"
            )));
        }
        let indexes = d_indexes.as_slice();
        let results = d_results.as_mut_slice();
        results[..num_seqs * num_colors].fill(0);
        for seq in 0..num_seqs {
            let first = (warps_intervals[seq] * WARP_SIZE) as usize;
            let last = (warps_intervals[seq + 1] * WARP_SIZE) as usize;
            let scores = &mut results[seq * num_colors..(seq + 1) * num_colors];
            for &index in &indexes[first..last] {
                if index == PAD || index as usize + 1 >= self.set_offsets.len() {
                    continue;
                }
                let start = self.set_offsets[index as usize] as usize;
                let end = self.set_offsets[index as usize + 1] as usize;
                for &color in &self.color_ids[start..end] {
                    scores[color as usize] += 1;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pack(bases: &str) -> Vec<u64> {
        let mut words = vec![0_u64; bases.len().div_ceil(32)];
        for (i, base) in bases.bytes().enumerate() {
            let bits = match base {
                b'A' => 0_u64,
                b'C' => 1,
                b'G' => 2,
                b'T' => 3,
                _ => unreachable!(),
            };
            words[i / 32] |= bits << (62 - 2 * (i % 32));
        }
        words
    }

    #[test]
    fn test_extract_kmer_code_across_word_boundary() {
        let bits = pack(&("A".repeat(31) + "CGT"));
        // k-mer starting at char 30 is "ACG" = 0b000110
        assert_eq!(extract_kmer_code(&bits, 30, 3), 0b00_01_10);
        // k-mer starting at char 31 spans both words: "CGT" = 0b011011
        assert_eq!(extract_kmer_code(&bits, 31, 3), 0b01_10_11);
    }

    #[test]
    fn test_search_finds_ranks_and_not_found() {
        let stream = GpuStream::new(0).unwrap();
        // index over the 3-mers ACG (0b000110 = 6) and CGT (0b011011 = 27)
        let container = SbwtContainer::from_codes(3, vec![27, 6]);
        assert_eq!(container.max_index(), 1);
        let bits = pack("ACGT");
        let mut d_bits = DeviceBuffer::alloc(bits.len()).unwrap();
        d_bits.copy_to(&stream, &bits).unwrap();
        let mut d_positions = DeviceBuffer::alloc(2).unwrap();
        d_positions.copy_to(&stream, &[0, 1]).unwrap();
        let mut d_results = DeviceBuffer::alloc(2).unwrap();
        container.launch_search(&stream, &d_bits, &d_positions, &mut d_results, 2).unwrap();
        let mut results = Vec::new();
        d_results.copy_from(&stream, &mut results, 2).unwrap();
        assert_eq!(results, vec![0, 1]);

        // GTA is not in the index
        d_positions.copy_to(&stream, &[2]).unwrap();
        container.launch_search(&stream, &d_bits, &d_positions, &mut d_results, 1).unwrap();
        d_results.copy_from(&stream, &mut results, 1).unwrap();
        assert_eq!(results, vec![NOT_FOUND]);
    }

    #[test]
    fn test_color_lookup_accumulates_per_seq() {
        let stream = GpuStream::new(0).unwrap();
        let container =
            ColorIndexContainer::from_sets(3, &[vec![0, 2], vec![1], vec![0]]);
        // two sequences: [0, 1] and [2], each padded to one warp
        let mut warped = vec![0_u64, 1];
        warped.resize(32, PAD);
        warped.push(2);
        warped.resize(64, PAD);
        let mut d_indexes = DeviceBuffer::alloc(64).unwrap();
        d_indexes.copy_to(&stream, &warped).unwrap();
        let mut d_results = DeviceBuffer::alloc(6).unwrap();
        container.launch_color(&stream, &d_indexes, &[0, 1, 2], &mut d_results, 2).unwrap();
        let mut results = Vec::new();
        d_results.copy_from(&stream, &mut results, 6).unwrap();
        assert_eq!(results, vec![1, 1, 1, 1, 0, 0]);
    }
}
