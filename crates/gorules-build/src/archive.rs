//! Unix `ar` archives
//!
//! Go packages are compiled straight into `ar` archives (`-pack`). This
//! module reads archives in the common, GNU and BSD dialects and appends new
//! members to an existing archive without touching its prior contents.

use crate::error::{BuildError, BuildResult};
use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Global archive header
pub const AR_MAGIC: &[u8; 8] = b"!<arch>\n";
/// Member header length
pub const HEADER_LEN: usize = 60;
/// Width of the member name field
pub const NAME_LEN: usize = 16;

const HEADER_END: &[u8; 2] = b"`\n";

/// A regular archive member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub name: String,
    pub data: Vec<u8>,
}

impl Member {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

/// Read every regular member of the archive at `path`
///
/// Symbol tables and GNU long-name tables are consumed but not returned.
pub fn read_members(path: &Path) -> BuildResult<Vec<Member>> {
    let bytes = fs::read(path).map_err(|e| BuildError::io(path, e))?;
    parse_members(&bytes).map_err(|reason| BuildError::archive(path, reason))
}

/// Names of the regular members of the archive at `path`, in order
pub fn member_names(path: &Path) -> BuildResult<Vec<String>> {
    Ok(read_members(path)?.into_iter().map(|m| m.name).collect())
}

/// Parse archive bytes
pub fn parse_members(bytes: &[u8]) -> Result<Vec<Member>, String> {
    if !bytes.starts_with(AR_MAGIC) {
        return Err("bad header".to_string());
    }

    let mut members = Vec::new();
    let mut long_names: &[u8] = &[];
    let mut pos = AR_MAGIC.len();

    while pos < bytes.len() {
        // Tolerate a trailing padding byte.
        if bytes.len() - pos == 1 && bytes[pos] == b'\n' {
            break;
        }
        let header = bytes
            .get(pos..pos + HEADER_LEN)
            .ok_or_else(|| format!("truncated member header at offset {}", pos))?;
        if &header[58..60] != HEADER_END {
            return Err(format!("corrupt member header at offset {}", pos));
        }
        let size = parse_decimal(&header[48..58])
            .ok_or_else(|| format!("bad member size at offset {}", pos))?;
        let start = pos + HEADER_LEN;
        let data = bytes
            .get(start..start + size)
            .ok_or_else(|| format!("truncated member data at offset {}", start))?;
        pos = start + size + size % 2;

        let raw_name = &header[..NAME_LEN];
        let name_field = String::from_utf8_lossy(raw_name).trim_end().to_string();

        match name_field.as_str() {
            "/" | "/SYM64/" | "__.SYMDEF" | "__.SYMDEF SORTED" | "__.SYMDEF_64"
            | "__.SYMDEF_64 SORTED" => continue,
            "//" => {
                long_names = data;
                continue;
            }
            _ => {}
        }

        let (name, data) = if let Some(len) = name_field.strip_prefix("#1/") {
            // BSD: the name precedes the data
            let len: usize = len
                .trim()
                .parse()
                .map_err(|_| format!("bad BSD name length '{}'", name_field))?;
            if len > data.len() {
                return Err(format!("BSD name longer than member '{}'", name_field));
            }
            let name = String::from_utf8_lossy(&data[..len])
                .trim_end_matches('\0')
                .to_string();
            (name, &data[len..])
        } else if let Some(offset) = name_field
            .strip_prefix('/')
            .and_then(|o| o.trim().parse::<usize>().ok())
        {
            // GNU: offset into the long-name table
            let rest = long_names
                .get(offset..)
                .ok_or_else(|| format!("long name offset {} out of range", offset))?;
            let end = rest
                .windows(2)
                .position(|w| w == b"/\n")
                .or_else(|| rest.iter().position(|&b| b == b'\n'))
                .unwrap_or(rest.len());
            (String::from_utf8_lossy(&rest[..end]).into_owned(), data)
        } else {
            (name_field.trim_end_matches('/').to_string(), data)
        };

        members.push(Member::new(name, data));
    }

    Ok(members)
}

fn parse_decimal(field: &[u8]) -> Option<usize> {
    std::str::from_utf8(field).ok()?.trim().parse().ok()
}

/// Member name as stored: at most `NAME_LEN` bytes, like `go tool pack`
fn stored_name(name: &str) -> &str {
    if name.len() <= NAME_LEN {
        return name;
    }
    let mut end = NAME_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

fn encode_member(out: &mut Vec<u8>, name: &str, data: &[u8]) {
    let header = format!(
        "{:<16}{:<12}{:<6}{:<6}{:<8}{:<10}",
        stored_name(name),
        0,
        0,
        0,
        644,
        data.len()
    );
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(HEADER_END);
    out.extend_from_slice(data);
    if data.len() % 2 == 1 {
        out.push(b'\n');
    }
}

/// Create a new archive containing `members`
pub fn write_archive(path: &Path, members: &[Member]) -> BuildResult<()> {
    let mut out = AR_MAGIC.to_vec();
    for member in members {
        encode_member(&mut out, &member.name, &member.data);
    }
    fs::write(path, out).map_err(|e| BuildError::io(path, e))
}

/// Append the files at `objects` as members of the existing archive `archive`
///
/// Prior members are left untouched and new members follow them in the
/// given order. All new members are encoded before the archive is opened
/// for writing.
pub fn append_files(archive: &Path, objects: &[PathBuf]) -> BuildResult<()> {
    if objects.is_empty() {
        return Ok(());
    }

    let mut batch = Vec::new();
    for object in objects {
        let data = fs::read(object).map_err(|e| BuildError::io(object, e))?;
        let name = object
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| BuildError::archive(object, "object has no file name"))?;
        encode_member(&mut batch, &name, &data);
    }

    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(archive)
        .map_err(|e| BuildError::io(archive, e))?;

    let mut magic = [0u8; 8];
    file.read_exact(&mut magic)
        .map_err(|_| BuildError::archive(archive, "bad header"))?;
    if &magic != AR_MAGIC {
        return Err(BuildError::archive(archive, "bad header"));
    }

    let end = file
        .seek(SeekFrom::End(0))
        .map_err(|e| BuildError::io(archive, e))?;
    if end % 2 == 1 {
        file.write_all(b"\n").map_err(|e| BuildError::io(archive, e))?;
    }
    file.write_all(&batch)
        .and_then(|_| file.flush())
        .map_err(|e| BuildError::io(archive, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn gnu_header(name: &str, size: usize) -> Vec<u8> {
        format!("{:<16}{:<12}{:<6}{:<6}{:<8}{:<10}`\n", name, 0, 0, 0, 644, size).into_bytes()
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("p.a");
        write_archive(
            &path,
            &[Member::new("__.PKGDEF", "go object\n"), Member::new("_go_.o", "odd")],
        )
        .unwrap();

        let members = read_members(&path).unwrap();
        assert_eq!(members[0], Member::new("__.PKGDEF", "go object\n"));
        assert_eq!(members[1], Member::new("_go_.o", "odd"));
    }

    #[test]
    fn test_bad_header() {
        assert_eq!(parse_members(b"not an archive"), Err("bad header".to_string()));
    }

    #[test]
    fn test_gnu_archive_with_symbols_and_long_names() {
        let long = b"a_rather_long_object_name.o/\nanother_long_object_name.o/\n";
        let mut bytes = AR_MAGIC.to_vec();
        bytes.extend(gnu_header("/", 4));
        bytes.extend(b"\0\0\0\0");
        bytes.extend(gnu_header("//", long.len()));
        bytes.extend(long);
        if long.len() % 2 == 1 {
            bytes.push(b'\n');
        }
        bytes.extend(gnu_header("/29", 2));
        bytes.extend(b"B!");
        bytes.extend(gnu_header("short.o/", 1));
        bytes.extend(b"S\n");

        let members = parse_members(&bytes).unwrap();
        let names: Vec<&str> = members.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["another_long_object_name.o", "short.o"]);
        assert_eq!(members[0].data, b"B!");
    }

    #[test]
    fn test_bsd_archive() {
        let mut bytes = AR_MAGIC.to_vec();
        bytes.extend(gnu_header("__.SYMDEF SORTED", 2));
        bytes.extend(b"xx");
        bytes.extend(gnu_header("#1/20", 24));
        bytes.extend(b"long_bsd_name.o\0\0\0\0\0");
        bytes.extend(b"DATA");

        let members = parse_members(&bytes).unwrap();
        assert_eq!(members, vec![Member::new("long_bsd_name.o", "DATA")]);
    }

    #[test]
    fn test_long_names_are_truncated_like_pack() {
        assert_eq!(stored_name("exactly16bytes.o"), "exactly16bytes.o");
        assert_eq!(stored_name("much_longer_than_sixteen.o"), "much_longer_than");
    }

    #[test]
    fn test_append_to_non_archive_fails() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("p.a");
        let obj = dir.path().join("x.o");
        fs::write(&target, "garbage!garbage").unwrap();
        fs::write(&obj, "obj").unwrap();

        let err = append_files(&target, &[obj]).unwrap_err();
        assert!(err.to_string().contains("bad header"));
    }

    #[test]
    fn test_append_missing_object_leaves_archive_untouched() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("p.a");
        write_archive(&target, &[Member::new("__.PKGDEF", "x")]).unwrap();
        let before = fs::read(&target).unwrap();

        let result = append_files(&target, &[dir.path().join("missing.o")]);
        assert!(result.is_err());
        assert_eq!(fs::read(&target).unwrap(), before);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_append_preserves_order(
            a in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 1..4),
            b in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 1..4),
        ) {
            let dir = TempDir::new().unwrap();
            let target = dir.path().join("p.a");
            write_archive(&target, &[Member::new("__.PKGDEF", "pkg")]).unwrap();

            let write_batch = |prefix: &str, contents: &[Vec<u8>]| -> Vec<PathBuf> {
                contents
                    .iter()
                    .enumerate()
                    .map(|(i, data)| {
                        let path = dir.path().join(format!("{}{}.o", prefix, i));
                        fs::write(&path, data).unwrap();
                        path
                    })
                    .collect()
            };
            let batch_a = write_batch("a", &a);
            let batch_b = write_batch("b", &b);

            append_files(&target, &batch_a).unwrap();
            append_files(&target, &batch_b).unwrap();

            let members = read_members(&target).unwrap();
            let mut expected = vec![Member::new("__.PKGDEF", "pkg")];
            expected.extend(a.iter().enumerate().map(|(i, d)| Member::new(format!("a{}.o", i), d.clone())));
            expected.extend(b.iter().enumerate().map(|(i, d)| Member::new(format!("b{}.o", i), d.clone())));
            prop_assert_eq!(members, expected);
        }
    }
}
