//! Cross-encoding result comparison.
//!
//! Decodes two result files, each in any of the four encodings, and
//! succeeds iff the decoded sequences-of-integer-sequences are identical.
//! On mismatch the record index, element index, and both file offsets go to
//! standard error and the command exits non-zero.

use anyhow::{bail, Result};
use clap::Parser;

use sbwtq_lib::formats::reader::SequenceReader;
use sbwtq_lib::formats::ResultFormat;

use crate::commands::command::Command;

/// Compare two result files across encodings.
#[derive(Debug, Parser)]
#[command(name = "formatdiff", about = "Compare two result files across encodings")]
pub struct Formatdiff {
    /// Encoding of the first file.
    pub format1: String,
    /// Encoding of the second file.
    pub format2: String,
    /// First file.
    pub file1: std::path::PathBuf,
    /// Second file.
    pub file2: std::path::PathBuf,
}

impl Command for Formatdiff {
    fn execute(&self) -> Result<()> {
        let format1: ResultFormat =
            self.format1.parse().map_err(|e: String| anyhow::anyhow!(e))?;
        let format2: ResultFormat =
            self.format2.parse().map_err(|e: String| anyhow::anyhow!(e))?;
        let mut reader1 = SequenceReader::open(&self.file1, format1)?;
        let mut reader2 = SequenceReader::open(&self.file2, format2)?;

        let mut record1 = Vec::new();
        let mut record2 = Vec::new();
        let mut record_index = 0_u64;
        loop {
            let more1 = reader1.read_record(&mut record1)?;
            let more2 = reader2.read_record(&mut record2)?;
            match (more1, more2) {
                (false, false) => return Ok(()),
                (false, true) => {
                    print_offsets(&reader1, &reader2);
                    bail!("File 1 ended before file 2 at record {record_index}");
                }
                (true, false) => {
                    print_offsets(&reader1, &reader2);
                    bail!("File 2 ended before file 1 at record {record_index}");
                }
                (true, true) => {}
            }
            if record1.len() != record2.len() {
                eprintln!(
                    "- Sequences differ: record {} has {} and {} elements",
                    record_index,
                    record1.len(),
                    record2.len()
                );
                print_offsets(&reader1, &reader2);
                bail!("Files differ at record {record_index}");
            }
            for (element_index, (a, b)) in record1.iter().zip(&record2).enumerate() {
                if a != b {
                    eprintln!(
                        "- Sequences differ at record {record_index} position {element_index}: {a} != {b}"
                    );
                    print_offsets(&reader1, &reader2);
                    bail!("Files differ at record {record_index} position {element_index}");
                }
            }
            record_index += 1;
        }
    }
}

fn print_offsets(reader1: &SequenceReader, reader2: &SequenceReader) {
    eprintln!("- File ({}) offset: {}", reader1.path().display(), reader1.offset());
    eprintln!("- File ({}) offset: {}", reader2.path().display(), reader2.offset());
}
