//! File-size load balancing across streams.
//!
//! Inputs are partitioned into `streams` groups by greedy longest-first
//! assignment on input file size, keeping each input paired with its output.
//! Streams then run fully independent pipelines over their groups.

use std::fs;
use std::path::PathBuf;

/// One stream's worth of paired input and output files.
#[derive(Debug, Default)]
pub struct StreamFiles {
    pub inputs: Vec<PathBuf>,
    pub outputs: Vec<PathBuf>,
}

/// Partition paired files into at most `streams` groups by input size.
///
/// Returns fewer groups when there are fewer files than streams; an
/// unreadable input file counts as empty and still gets assigned.
#[must_use]
pub fn partition(
    inputs: Vec<PathBuf>,
    outputs: Vec<PathBuf>,
    streams: u64,
) -> Vec<StreamFiles> {
    let num_streams = (streams as usize).min(inputs.len()).max(1);
    let mut sized: Vec<(u64, PathBuf, PathBuf)> = inputs
        .into_iter()
        .zip(outputs)
        .map(|(input, output)| {
            let size = fs::metadata(&input).map(|m| m.len()).unwrap_or(0);
            (size, input, output)
        })
        .collect();
    sized.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    let mut groups: Vec<StreamFiles> = (0..num_streams).map(|_| StreamFiles::default()).collect();
    let mut group_sizes = vec![0_u64; num_streams];
    for (size, input, output) in sized {
        let lightest = group_sizes
            .iter()
            .enumerate()
            .min_by_key(|(_, total)| **total)
            .map(|(i, _)| i)
            .unwrap_or(0);
        groups[lightest].inputs.push(input);
        groups[lightest].outputs.push(output);
        group_sizes[lightest] += size;
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn file_of_size(dir: &TempDir, name: &str, size: usize) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(&vec![b'A'; size]).unwrap();
        path
    }

    #[test]
    fn test_partition_balances_by_size() {
        let dir = TempDir::new().unwrap();
        let inputs = vec![
            file_of_size(&dir, "big.fna", 1000),
            file_of_size(&dir, "small1.fna", 300),
            file_of_size(&dir, "small2.fna", 300),
            file_of_size(&dir, "small3.fna", 300),
        ];
        let outputs: Vec<PathBuf> =
            (0..4).map(|i| dir.path().join(format!("out{i}"))).collect();
        let groups = partition(inputs.clone(), outputs, 2);
        assert_eq!(groups.len(), 2);
        // the big file gets a stream (almost) to itself
        let big_group = groups
            .iter()
            .find(|g| g.inputs.contains(&inputs[0]))
            .unwrap();
        assert!(big_group.inputs.len() <= 2);
        let total: usize = groups.iter().map(|g| g.inputs.len()).sum();
        assert_eq!(total, 4);
    }

    #[test]
    fn test_streams_capped_by_file_count() {
        let dir = TempDir::new().unwrap();
        let inputs = vec![file_of_size(&dir, "only.fna", 10)];
        let outputs = vec![dir.path().join("out")];
        let groups = partition(inputs, outputs, 8);
        assert_eq!(groups.len(), 1);
    }

    #[test]
    fn test_pairing_is_preserved() {
        let dir = TempDir::new().unwrap();
        let inputs = vec![
            file_of_size(&dir, "a.fna", 10),
            file_of_size(&dir, "b.fna", 20),
        ];
        let outputs = vec![PathBuf::from("out_a"), PathBuf::from("out_b")];
        let groups = partition(inputs, outputs, 2);
        for group in &groups {
            for (input, output) in group.inputs.iter().zip(&group.outputs) {
                let stem = input.file_stem().unwrap().to_str().unwrap();
                assert!(output.to_str().unwrap().ends_with(stem));
            }
        }
    }
}
