//! Input/output plumbing shared by the command-line tools.
//!
//! `-` means stdin or stdout. Compressed inputs and outputs are detected
//! from the file extension (`.gz`, `.bz2`); bzip2 is read-only, which is
//! all a dump pipeline needs.

use bzip2_rs::DecoderReader;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::borrow::Cow;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};

/// Errors from option parsing helpers in this module.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An unsupported `-c` encoding name.
    #[error("unknown encoding '{0}' (expected 'utf-8' or 'latin-1')")]
    UnknownEncoding(String),
}

/// The input text encodings the tools can decode.
///
/// Dumps are UTF-8; latin-1 covers the stray legacy exports. Everything is
/// Unicode once it reaches the tokenizer.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Encoding {
    /// UTF-8, decoded lossily.
    #[default]
    Utf8,
    /// ISO-8859-1, a plain byte-to-scalar mapping.
    Latin1,
}

impl core::str::FromStr for Encoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("utf-8") || s.eq_ignore_ascii_case("utf8") {
            Ok(Self::Utf8)
        } else if s.eq_ignore_ascii_case("latin-1")
            || s.eq_ignore_ascii_case("latin1")
            || s.eq_ignore_ascii_case("iso-8859-1")
        {
            Ok(Self::Latin1)
        } else {
            Err(Error::UnknownEncoding(s.to_string()))
        }
    }
}

impl Encoding {
    /// Decodes a byte buffer to text.
    pub fn decode<'a>(self, bytes: &'a [u8]) -> Cow<'a, str> {
        match self {
            Self::Utf8 => String::from_utf8_lossy(bytes),
            Self::Latin1 => Cow::Owned(bytes.iter().map(|&b| char::from(b)).collect()),
        }
    }
}

/// Opens an input path for buffered reading, decompressing `.gz` and
/// `.bz2` transparently. `-` is stdin.
pub fn open_input(path: &str) -> std::io::Result<Box<dyn BufRead>> {
    if path == "-" {
        return Ok(Box::new(BufReader::new(std::io::stdin())));
    }
    let file = File::open(path)?;
    let reader: Box<dyn Read> = if path.ends_with(".gz") {
        Box::new(GzDecoder::new(BufReader::new(file)))
    } else if path.ends_with(".bz2") {
        Box::new(DecoderReader::new(BufReader::new(file)))
    } else {
        Box::new(file)
    };
    Ok(Box::new(BufReader::new(reader)))
}

/// Opens an output path for buffered writing, gzip-compressing when the
/// path ends in `.gz`. `-` is stdout.
pub fn create_output(path: &str) -> std::io::Result<Box<dyn Write>> {
    if path == "-" {
        return Ok(Box::new(BufWriter::new(std::io::stdout())));
    }
    create_file(path, path.ends_with(".gz"))
}

/// Creates a file for writing, gzip-compressed when `gzip` is set.
pub fn create_file(path: &str, gzip: bool) -> std::io::Result<Box<dyn Write>> {
    let file = File::create(path)?;
    if gzip {
        Ok(Box::new(BufWriter::new(GzEncoder::new(
            file,
            Compression::default(),
        ))))
    } else {
        Ok(Box::new(BufWriter::new(file)))
    }
}

/// Expands a path template, substituting `{name}` with the
/// quoted-printable-encoded title, and `{pageid}`/`{revid}` with the ids.
pub fn expand_template(template: &str, title: &str, pageid: u64, revid: u64) -> String {
    template
        .replace("{name}", &quopri_encode(title))
        .replace("{pageid}", &pageid.to_string())
        .replace("{revid}", &revid.to_string())
}

/// Quoted-printable-encodes a title for use as a file name.
///
/// Printable ASCII passes through; everything else, plus `=` and the path
/// separator, becomes `=XX` per UTF-8 byte.
pub fn quopri_encode(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    for byte in title.bytes() {
        if (b' '..=b'~').contains(&byte) && byte != b'=' && byte != b'/' {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("={byte:02X}"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_names() {
        assert_eq!("utf-8".parse::<Encoding>().unwrap(), Encoding::Utf8);
        assert_eq!("UTF8".parse::<Encoding>().unwrap(), Encoding::Utf8);
        assert_eq!("latin-1".parse::<Encoding>().unwrap(), Encoding::Latin1);
        assert!("koi8-r".parse::<Encoding>().is_err());
    }

    #[test]
    fn latin1_maps_bytes_to_scalars() {
        assert_eq!(Encoding::Latin1.decode(&[0x61, 0xe9]), "aé");
    }

    #[test]
    fn quopri_passes_printable_ascii() {
        assert_eq!(quopri_encode("Main Page"), "Main Page");
    }

    #[test]
    fn quopri_escapes_the_rest() {
        assert_eq!(quopri_encode("A/B=C"), "A=2FB=3DC");
        assert_eq!(quopri_encode("é"), "=C3=A9");
    }

    #[test]
    fn template_expansion() {
        assert_eq!(
            expand_template("out/{pageid}-{revid}-{name}.txt", "A/B", 7, 9),
            "out/7-9-A=2FB.txt"
        );
    }

    #[test]
    fn gzip_round_trip() {
        let path = std::env::temp_dir().join(format!("mwp-io-test-{}.gz", std::process::id()));
        let path = path.to_string_lossy().into_owned();
        {
            let mut out = create_output(&path).unwrap();
            out.write_all("hello dump".as_bytes()).unwrap();
        }
        let mut back = String::new();
        open_input(&path).unwrap().read_to_string(&mut back).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(back, "hello dump");
    }
}
