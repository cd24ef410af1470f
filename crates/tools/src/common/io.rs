//! ファイル入出力（`.gz` は透過的に圧縮・展開する。`-` は標準入出力）

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::Serialize;

const READER_BUF_CAP: usize = 64 * 1024;

fn is_stdio(path: &Path) -> bool {
    path.as_os_str() == "-"
}

fn is_gzip(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("gz"))
}

pub fn open_reader<P: AsRef<Path>>(path: P) -> io::Result<Box<dyn BufRead>> {
    let path = path.as_ref();
    if is_stdio(path) {
        return Ok(Box::new(BufReader::with_capacity(READER_BUF_CAP, io::stdin())));
    }
    let file = File::open(path)?;
    if is_gzip(path) {
        let decoder = flate2::read::GzDecoder::new(file);
        return Ok(Box::new(BufReader::with_capacity(READER_BUF_CAP, decoder)));
    }
    Ok(Box::new(BufReader::with_capacity(READER_BUF_CAP, file)))
}

/// 出力先。圧縮ストリームの終端エラーを拾うため `close()` で閉じること。
#[must_use = "call .close() to propagate compression/IO errors"]
pub enum Writer {
    Plain(BufWriter<File>),
    Stdout(io::Stdout),
    Gz(flate2::write::GzEncoder<BufWriter<File>>),
}

impl Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Writer::Plain(w) => w.write(buf),
            Writer::Stdout(w) => w.write(buf),
            Writer::Gz(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Writer::Plain(w) => w.flush(),
            Writer::Stdout(w) => w.flush(),
            Writer::Gz(w) => w.flush(),
        }
    }
}

impl Writer {
    /// 1行分の JSON を書く
    pub fn write_json_line<T: Serialize>(&mut self, value: &T) -> io::Result<()> {
        serde_json::to_writer(&mut *self, value)?;
        self.write_all(b"\n")
    }

    pub fn close(self) -> io::Result<()> {
        match self {
            Writer::Plain(w) => w.into_inner().map_err(|e| e.into_error())?.flush(),
            Writer::Stdout(mut w) => w.flush(),
            Writer::Gz(w) => w.finish()?.flush(),
        }
    }
}

/// 書き込み用に開く。親ディレクトリが無ければ作る。
pub fn open_writer<P: AsRef<Path>>(path: P) -> io::Result<Writer> {
    let path = path.as_ref();
    if is_stdio(path) {
        return Ok(Writer::Stdout(io::stdout()));
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = BufWriter::new(File::create(path)?);
    if is_gzip(path) {
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        return Ok(Writer::Gz(encoder));
    }
    Ok(Writer::Plain(file))
}
