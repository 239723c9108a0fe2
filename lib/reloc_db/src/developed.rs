//!
//! @file developed.rs
//! @brief Line-oriented interchange format for a single item.
//! @bug No known bugs.
//!
//! The developer file is the editable face of one item. The format is one
//! header line naming the item, then one entry per line:
//!
//! ```text
//! # Anything after a hash is a comment.
//! item WindowResize
//! 1.6.438.0 0x1492a0 patch 90 90 90 90 90
//! 1.6.438.0 0x1492b8 call 0x20040
//! 1.6.1130.0 0x14b170 jump 0x20040
//! ```
//!
//! Byte patches list their payload as hex byte pairs; redirects list the
//! module-relative target offset. For an unmodified item, save followed by
//! load reproduces the exact entry sequence.
//!

use std::io::{BufWriter, Write};
use std::path::Path;

use host_common::version::RuntimeVersion;

use crate::entry::{RelocKind, RelocationEntry};
use crate::error::{Error, Result};
use crate::item::RelocationDatabaseItem;

impl RelocationDatabaseItem {
    /// Parses a developer file into a fresh item.
    pub fn load_developed(
        path: &Path
    ) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let file = path.display().to_string();

        let mut item: Option<RelocationDatabaseItem> = None;
        for (idx, raw) in text.lines().enumerate() {
            let line = strip_comment(raw).trim();
            if line.is_empty() {
                continue;
            }

            if let Some(name) = line.strip_prefix("item ") {
                if item.is_some() {
                    return Err(err(&file, idx + 1, "a file describes exactly one item"));
                }
                item = Some(Self::new(name.trim()));
                continue;
            }

            let item = item.as_mut()
                .ok_or_else(|| err(&file, idx + 1, "entries must follow an \"item\" line"))?;
            item.push(parse_entry(&file, idx + 1, line)?);
        }

        let mut item = item
            .ok_or_else(|| err(&file, text.lines().count(), "missing \"item\" header line"))?;
        item.set_source(&file);
        Ok(item)
    }

    /// Writes this item as a developer file, the inverse of load.
    pub fn save_developed(
        &self,
        path: &Path
    ) -> Result<()> {
        let mut f = BufWriter::new(std::fs::File::create(path)?);

        writeln!(f, "# Relocation item interchange file.")?;
        if !self.source().is_empty() {
            writeln!(f, "# source: {}", self.source())?;
        }
        writeln!(f, "item {}", self.name())?;

        for entry in self.entries() {
            write!(f, "{} {:#x} {}", entry.version(), entry.offset(), entry.kind().keyword())?;
            match entry.kind() {
                RelocKind::Patch => {
                    for b in entry.payload() {
                        write!(f, " {:02x}", b)?;
                    }
                },
                RelocKind::Call | RelocKind::Jump => {
                    let target = entry.redirect_target()
                        .ok_or(Error::Corrupt("redirect entry carries a malformed target"))?;
                    write!(f, " {:#x}", target.offset())?;
                }
            }
            writeln!(f)?;
        }

        f.flush()?;
        Ok(())
    }
}

fn strip_comment(
    line: &str
) -> &str {
    match line.find('#') {
        Some(i) => &line[..i],
        None => line
    }
}

fn err(
    path: &str,
    line: usize,
    reason: &str
) -> Error {
    Error::Developed {
        path: path.to_string(),
        line,
        reason: reason.to_string()
    }
}

fn parse_entry(
    path: &str,
    line_no: usize,
    line: &str
) -> Result<RelocationEntry> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 3 {
        return Err(err(path, line_no, "expected: VERSION OFFSET KIND PAYLOAD..."));
    }

    let version: RuntimeVersion = tokens[0].parse()
        .map_err(|_| err(path, line_no, "malformed version"))?;
    let offset = parse_num(tokens[1])
        .ok_or_else(|| err(path, line_no, "malformed offset"))?;
    let kind = RelocKind::from_keyword(tokens[2])
        .ok_or_else(|| err(path, line_no, "unknown relocation kind"))?;

    match kind {
        RelocKind::Patch => {
            let mut payload = Vec::new();
            for tok in tokens[3..].iter() {
                let b = u8::from_str_radix(tok, 16)
                    .map_err(|_| err(path, line_no, "payload bytes must be hex pairs"))?;
                payload.push(b);
            }

            Ok(RelocationEntry::patch(version, offset, payload))
        },
        RelocKind::Call | RelocKind::Jump => {
            if tokens.len() != 4 {
                return Err(err(path, line_no, "expected exactly one redirect target"));
            }
            let target = parse_num(tokens[3])
                .ok_or_else(|| err(path, line_no, "malformed redirect target"))?;
            Ok(RelocationEntry::redirect(
                version,
                offset,
                kind,
                host_common::reloc::RelocAddr::from_offset(target as usize)
            ))
        }
    }
}

/// Parses a decimal or 0x-prefixed hex number.
fn parse_num(
    tok: &str
) -> Option<u64> {
    if let Some(hex) = tok.strip_prefix("0x").or_else(|| tok.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else {
        tok.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use host_common::version::{RUNTIME_VERSION_1_5_73, RUNTIME_VERSION_1_6_438};
    use host_common::reloc::RelocAddr;

    fn sample_item() -> RelocationDatabaseItem {
        let mut item = RelocationDatabaseItem::new("WindowResize");
        item.push(RelocationEntry::patch(RUNTIME_VERSION_1_6_438, 0x1492a0, vec![0x90; 5]));
        item.push(RelocationEntry::redirect(
            RUNTIME_VERSION_1_6_438,
            0x1492b8,
            RelocKind::Call,
            RelocAddr::from_offset(0x20040)
        ));
        item.push(RelocationEntry::redirect(
            RUNTIME_VERSION_1_5_73,
            0x14b170,
            RelocKind::Jump,
            RelocAddr::from_offset(0x20040)
        ));
        item
    }

    #[test]
    fn save_then_load_is_the_identity_on_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("windowresize.txt");

        let item = sample_item();
        item.save_developed(&path).unwrap();
        let reloaded = RelocationDatabaseItem::load_developed(&path).unwrap();

        assert_eq!(reloaded.name(), item.name());
        assert_eq!(reloaded.entries(), item.entries());
    }

    // The binary format allows a zero-length payload, so the developer
    // form has to take the bare three-token line back.
    #[test]
    fn empty_payload_patch_survives_the_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.txt");

        let mut item = RelocationDatabaseItem::new("Empty");
        item.push(RelocationEntry::patch(RUNTIME_VERSION_1_6_438, 0x10, vec![]));
        item.save_developed(&path).unwrap();

        let reloaded = RelocationDatabaseItem::load_developed(&path).unwrap();
        assert_eq!(reloaded.entries(), item.entries());
        assert!(reloaded.entries()[0].payload().is_empty());
    }

    #[test]
    fn redirect_without_a_target_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.txt");
        std::fs::write(&path, "item Bad\n1.6.438.0 0x10 call\n").unwrap();
        assert!(matches!(
            RelocationDatabaseItem::load_developed(&path),
            Err(Error::Developed { line: 2, .. })
        ));
    }

    #[test]
    fn load_records_the_file_as_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("windowresize.txt");

        sample_item().save_developed(&path).unwrap();
        let reloaded = RelocationDatabaseItem::load_developed(&path).unwrap();
        assert!(reloaded.source().ends_with("windowresize.txt"));
    }

    #[test]
    fn comments_and_blank_lines_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sparse.txt");
        std::fs::write(&path, concat!(
            "# header comment\n",
            "\n",
            "item Sparse # trailing comment\n",
            "\n",
            "1.6.438.0 0x10 patch 90 90 # nops\n"
        )).unwrap();

        let item = RelocationDatabaseItem::load_developed(&path).unwrap();
        assert_eq!(item.name(), "Sparse");
        assert_eq!(item.len(), 1);
        assert_eq!(item.entries()[0].payload(), &[0x90, 0x90]);
    }

    #[test]
    fn entry_before_header_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.txt");
        std::fs::write(&path, "1.6.438.0 0x10 patch 90\n").unwrap();
        assert!(matches!(
            RelocationDatabaseItem::load_developed(&path),
            Err(Error::Developed { line: 1, .. })
        ));
    }

    #[test]
    fn unknown_kind_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.txt");
        std::fs::write(&path, "item Bad\n1.6.438.0 0x10 erase 90\n").unwrap();
        assert!(RelocationDatabaseItem::load_developed(&path).is_err());
    }
}
