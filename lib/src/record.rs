use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use async_trait::async_trait;
use eyre::Result;
use humantime_serde::re::humantime;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt as _, AsyncWrite, AsyncWriteExt as _};

use crate::error::Error;

/// A key as read from input, before the series' key domain is known.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawKey {
    Numeric(f64),
    Time(SystemTime),
}

impl RawKey {
    pub fn domain_name(&self) -> &'static str {
        match self {
            RawKey::Numeric(_) => "numeric",
            RawKey::Time(_) => "timestamp",
        }
    }
}

impl FromStr for RawKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        let s = s.trim();
        if let Ok(n) = s.parse::<f64>() {
            if n.is_finite() {
                return Ok(RawKey::Numeric(n));
            }
        }
        humantime::parse_rfc3339_weak(s)
            .map(RawKey::Time)
            .map_err(|_| Error::BadKey(s.to_string()))
    }
}

impl fmt::Display for RawKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RawKey::Numeric(n) => write!(f, "{}", n),
            RawKey::Time(t) => write!(f, "{}", humantime::format_rfc3339_micros(*t)),
        }
    }
}

impl Serialize for RawKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RawKey::Numeric(n) => serializer.serialize_f64(*n),
            RawKey::Time(_) => serializer.collect_str(self),
        }
    }
}

impl<'de> Deserialize<'de> for RawKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(f64),
            Text(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Number(n) => Ok(RawKey::Numeric(n)),
            Repr::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

impl From<f64> for RawKey {
    fn from(n: f64) -> Self {
        RawKey::Numeric(n)
    }
}

impl From<SystemTime> for RawKey {
    fn from(t: SystemTime) -> Self {
        RawKey::Time(t)
    }
}

// Record is one (segment, key, value) row of a time vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment: Option<String>,
    #[serde(alias = "time", alias = "ts")]
    pub key: RawKey,
    #[serde(alias = "val")]
    pub value: f64,
}

impl Record {
    pub fn new(segment: Option<String>, key: impl Into<RawKey>, value: f64) -> Self {
        Record {
            segment,
            key: key.into(),
            value,
        }
    }
}

#[async_trait]
pub trait Codec {
    async fn encode<W: AsyncWrite + Unpin + Send>(
        &self,
        writer: &mut W,
        record: &Record,
    ) -> Result<()>;
    /// Reads the next record, or `None` once the input is exhausted.
    async fn decode<R: AsyncBufRead + Unpin + Send>(
        &self,
        reader: &mut R,
    ) -> Result<Option<Record>>;
}

pub struct JsonCodec;

#[async_trait]
impl Codec for JsonCodec {
    async fn encode<W: AsyncWrite + Unpin + Send>(
        &self,
        writer: &mut W,
        record: &Record,
    ) -> Result<()> {
        writer.write_all(&serde_json::to_vec(record)?).await?;
        writer.write_all(b"\n").await?;
        Ok(())
    }

    async fn decode<R: AsyncBufRead + Unpin + Send>(
        &self,
        reader: &mut R,
    ) -> Result<Option<Record>> {
        let Some(line) = next_line(reader).await? else {
            return Ok(None);
        };
        serde_json::from_slice(&line)
            .map(Some)
            .map_err(|e| eyre::eyre!(e))
    }
}

/// Rows of `key,value` or `segment,key,value`.
#[derive(Default)]
pub struct CsvCodec {
    seen_first: AtomicBool,
}

impl CsvCodec {
    pub fn new() -> Self {
        Self::default()
    }

    fn parse(&self, row: &csv::StringRecord) -> Result<Record> {
        let (segment, key, value) = match row.len() {
            2 => (None, &row[0], &row[1]),
            3 => (Some(row[0].to_string()), &row[1], &row[2]),
            n => eyre::bail!("bad csv record: expected 2 or 3 fields, got {}", n),
        };
        let value: f64 = value
            .trim()
            .parse()
            .map_err(|_| eyre::eyre!("bad value: {:?}", value))?;
        Ok(Record {
            segment,
            key: key.parse()?,
            value,
        })
    }
}

#[async_trait]
impl Codec for CsvCodec {
    async fn encode<W: AsyncWrite + Unpin + Send>(
        &self,
        writer: &mut W,
        record: &Record,
    ) -> Result<()> {
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        let key = record.key.to_string();
        let value = record.value.to_string();
        match &record.segment {
            Some(segment) => wtr.write_record([segment.as_str(), key.as_str(), value.as_str()])?,
            None => wtr.write_record([key.as_str(), value.as_str()])?,
        }
        let buf = wtr.into_inner().map_err(|e| eyre::eyre!(e.to_string()))?;
        writer.write_all(&buf).await?;
        Ok(())
    }

    async fn decode<R: AsyncBufRead + Unpin + Send>(
        &self,
        reader: &mut R,
    ) -> Result<Option<Record>> {
        loop {
            let Some(line) = next_line(reader).await? else {
                return Ok(None);
            };
            let mut rdr = csv::ReaderBuilder::new()
                .has_headers(false)
                .trim(csv::Trim::All)
                .from_reader(line.as_slice());
            let Some(row) = rdr.records().next().transpose()? else {
                continue;
            };

            let first = !self.seen_first.swap(true, Ordering::SeqCst);
            match self.parse(&row) {
                Ok(record) => return Ok(Some(record)),
                // A leading row that doesn't parse is a header.
                Err(e) if first => tracing::debug!("skipping csv header {:?}: {}", row, e),
                Err(e) => return Err(e),
            }
        }
    }
}

/// Input encodings, told apart by their first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Csv,
}

impl Format {
    pub fn detect(first: u8) -> Format {
        if first == b'{' {
            Format::Json
        } else {
            Format::Csv
        }
    }
}

/// Reads every record from `reader`, detecting its encoding.
pub async fn read_records<R: AsyncBufRead + Unpin + Send>(reader: &mut R) -> Result<Vec<Record>> {
    let buf = reader.fill_buf().await?;
    let Some(&first) = buf.iter().find(|b| !b.is_ascii_whitespace()) else {
        return Ok(Vec::new());
    };

    let mut records = Vec::new();
    match Format::detect(first) {
        Format::Json => {
            while let Some(record) = JsonCodec.decode(reader).await? {
                records.push(record);
            }
        }
        Format::Csv => {
            let codec = CsvCodec::new();
            while let Some(record) = codec.decode(reader).await? {
                records.push(record);
            }
        }
    }
    Ok(records)
}

/// Next non-blank line without its terminator, or `None` at end of input.
async fn next_line<R: AsyncBufRead + Unpin + Send>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    loop {
        let mut buf = Vec::new();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(None);
        }
        if buf.iter().any(|b| !b.is_ascii_whitespace()) {
            while buf.last().map_or(false, |b| b.is_ascii_whitespace()) {
                buf.pop();
            }
            return Ok(Some(buf));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};
    use tokio::io::BufReader;

    fn jan(day: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(1_577_836_800 + (day - 1) * 86_400)
    }

    #[test]
    fn raw_key_parsing() {
        assert_eq!("3.5".parse::<RawKey>(), Ok(RawKey::Numeric(3.5)));
        assert_eq!(" 42 ".parse::<RawKey>(), Ok(RawKey::Numeric(42.0)));
        assert_eq!(
            "2020-01-02T00:00:00Z".parse::<RawKey>(),
            Ok(RawKey::Time(jan(2)))
        );
        assert_eq!(
            "2020-01-02 00:00:00".parse::<RawKey>(),
            Ok(RawKey::Time(jan(2)))
        );
        assert_eq!(
            "yesterday".parse::<RawKey>(),
            Err(Error::BadKey("yesterday".to_string()))
        );
        assert!("inf".parse::<RawKey>().is_err());
    }

    #[test]
    fn raw_key_display() {
        assert_eq!(RawKey::Numeric(7.0).to_string(), "7");
        assert_eq!(
            RawKey::Time(jan(4) + Duration::from_micros(250)).to_string(),
            "2020-01-04T00:00:00.000250Z"
        );
    }

    #[tokio::test]
    async fn json_decoding() {
        let input = b"{\"segment\":\"device-1\",\"time\":\"2020-01-01T00:00:00Z\",\"val\":10}\n\
                      \n\
                      {\"key\":3,\"value\":-1.5}\n" as &[u8];
        let mut reader = BufReader::new(input);
        let first = JsonCodec.decode(&mut reader).await.unwrap().unwrap();
        assert_eq!(first, Record::new(Some("device-1".into()), jan(1), 10.0));
        let second = JsonCodec.decode(&mut reader).await.unwrap().unwrap();
        assert_eq!(second, Record::new(None, 3.0, -1.5));
        assert!(JsonCodec.decode(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn json_encoding() {
        let mut out = Vec::new();
        JsonCodec
            .encode(&mut out, &Record::new(Some("a".into()), jan(1), 2.5))
            .await
            .unwrap();
        JsonCodec
            .encode(&mut out, &Record::new(None, 4.0, 1.0))
            .await
            .unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "{\"segment\":\"a\",\"key\":\"2020-01-01T00:00:00.000000Z\",\"value\":2.5}\n\
             {\"key\":4.0,\"value\":1.0}\n"
        );
    }

    #[tokio::test]
    async fn csv_decoding_skips_header() {
        let input = b"device,time,value\n\
                      d1,2020-01-01T00:00:00Z,10\n\
                      d2, 2020-01-02T00:00:00Z , 21.5\n" as &[u8];
        let mut reader = BufReader::new(input);
        let records = read_records(&mut reader).await.unwrap();
        assert_eq!(
            records,
            vec![
                Record::new(Some("d1".into()), jan(1), 10.0),
                Record::new(Some("d2".into()), jan(2), 21.5),
            ]
        );
    }

    #[tokio::test]
    async fn csv_rejects_bad_rows_after_first() {
        let input = b"0,1\n1,oops\n" as &[u8];
        let mut reader = BufReader::new(input);
        assert!(read_records(&mut reader).await.is_err());
    }

    #[tokio::test]
    async fn csv_encoding() {
        let mut out = Vec::new();
        let codec = CsvCodec::new();
        codec
            .encode(&mut out, &Record::new(Some("d,1".into()), 1.5, 3.0))
            .await
            .unwrap();
        codec
            .encode(&mut out, &Record::new(None, jan(1), -2.0))
            .await
            .unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "\"d,1\",1.5,3\n2020-01-01T00:00:00.000000Z,-2\n"
        );
    }

    #[tokio::test]
    async fn read_records_detects_json() {
        let input = b"  \n{\"key\":1,\"value\":2}\n" as &[u8];
        let mut reader = BufReader::new(input);
        let records = read_records(&mut reader).await.unwrap();
        assert_eq!(records, vec![Record::new(None, 1.0, 2.0)]);
    }

    #[tokio::test]
    async fn read_records_empty_input() {
        let mut reader = BufReader::new(b"" as &[u8]);
        assert!(read_records(&mut reader).await.unwrap().is_empty());
    }
}
