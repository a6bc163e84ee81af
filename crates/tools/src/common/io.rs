//! チャンク列ファイルの入出力（gzip対応）
//!
//! パス `-` は stdin / stdout、拡張子 `.gz` は gzip として扱う。

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

const READER_BUF_CAP: usize = 128 * 1024; // 128 KiB

/// パスの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target<'a> {
    Stdio,
    Plain(&'a Path),
    Gz(&'a Path),
}

impl<'a> Target<'a> {
    pub fn of(path: &'a Path) -> Self {
        if path.as_os_str() == "-" {
            return Self::Stdio;
        }
        let gz = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("gz"));
        if gz { Self::Gz(path) } else { Self::Plain(path) }
    }
}

pub fn open_reader<P: AsRef<Path>>(path: P) -> io::Result<Box<dyn BufRead>> {
    Ok(match Target::of(path.as_ref()) {
        Target::Stdio => Box::new(BufReader::with_capacity(READER_BUF_CAP, io::stdin())),
        Target::Plain(p) => Box::new(BufReader::with_capacity(READER_BUF_CAP, File::open(p)?)),
        Target::Gz(p) => Box::new(BufReader::with_capacity(
            READER_BUF_CAP,
            GzDecoder::new(File::open(p)?),
        )),
    })
}

/// 出力先
///
/// gzip の終端書き込みエラーを拾うため、最後に `close` を呼ぶ。
#[must_use = "call .close() to propagate compression/IO errors"]
pub enum Writer {
    Stdout(io::Stdout),
    Plain(BufWriter<File>),
    Gz(GzEncoder<BufWriter<File>>),
}

impl Writer {
    fn inner(&mut self) -> &mut dyn Write {
        match self {
            Writer::Stdout(s) => s,
            Writer::Plain(f) => f,
            Writer::Gz(e) => e,
        }
    }

    pub fn close(self) -> io::Result<()> {
        let mut file = match self {
            Writer::Stdout(mut s) => return s.flush(),
            Writer::Plain(f) => f,
            Writer::Gz(e) => e.finish()?,
        };
        file.flush()
    }
}

impl Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner().flush()
    }
}

pub fn open_writer<P: AsRef<Path>>(path: P) -> io::Result<Writer> {
    Ok(match Target::of(path.as_ref()) {
        Target::Stdio => Writer::Stdout(io::stdout()),
        Target::Plain(p) => Writer::Plain(BufWriter::new(File::create(p)?)),
        Target::Gz(p) => {
            Writer::Gz(GzEncoder::new(BufWriter::new(File::create(p)?), Compression::default()))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_target_of() {
        assert_eq!(Target::of(Path::new("-")), Target::Stdio);
        assert!(matches!(Target::of(Path::new("act.json")), Target::Plain(_)));
        assert!(matches!(Target::of(Path::new("act.json.GZ")), Target::Gz(_)));
    }

    #[test]
    fn test_gz_chunks_through_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chunks.json.gz");

        let mut w = open_writer(&path).unwrap();
        w.write_all(b"[[1.0, 2.0]]").unwrap();
        w.close().unwrap();

        // 圧縮されている
        assert_ne!(std::fs::read(&path).unwrap(), b"[[1.0, 2.0]]");
        let mut s = String::new();
        open_reader(&path).unwrap().read_to_string(&mut s).unwrap();
        assert_eq!(s, "[[1.0, 2.0]]");
    }
}
