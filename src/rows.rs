use std::io::Read;

use log::{debug, warn};
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::template::Variables;

/// Column names of the first record and the position each one reads from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    columns: Vec<(String, usize)>,
}

impl Header {
    /// A name repeated in the header reads from its last position
    pub fn from_record(record: &csv::ByteRecord) -> Self {
        let mut columns: Vec<(String, usize)> = Vec::with_capacity(record.len());
        for (position, name) in record.iter().map(decode).enumerate() {
            match columns.iter_mut().find(|(existing, _)| *existing == name) {
                Some(column) => {
                    warn!("Column {name:?} appears more than once in the header, using the one at position {position}");
                    column.1 = position;
                }
                None => columns.push((name, position)),
            }
        }
        Self { columns }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.iter().any(|(column, _)| column == name)
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, usize)> {
        self.columns.iter().map(|(name, pos)| (name.as_str(), *pos))
    }

    /// Pairs each column with its cell, leaving out cells the record is too short to have
    fn zip(&self, record: &csv::ByteRecord) -> Vec<(String, String)> {
        self.columns
            .iter()
            .filter_map(|(name, pos)| Some((name.clone(), decode(record.get(*pos)?))))
            .collect()
    }
}

/// Cells that are not UTF-8 keep their row alive, with U+FFFD for each bad sequence
fn decode(cell: &[u8]) -> String {
    String::from_utf8_lossy(cell).into_owned()
}

impl Serialize for Header {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (name, pos) in &self.columns {
            map.serialize_entry(name, pos)?;
        }
        map.end()
    }
}

/// Cell values of one data record keyed by column name, in header order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    /// 1-based number of the record in the file, the header being record 1
    pub number: u64,
    values: Vec<(String, String)>,
}

impl Row {
    pub fn new(number: u64, values: Vec<(String, String)>) -> Self {
        Self { number, values }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| format!("{:?} ({e})", self.values))
    }
}

impl Variables for Row {
    fn get(&self, name: &str) -> Option<&str> {
        Row::get(self, name)
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in &self.values {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Forward-only sequence of rows from delimited text whose first record is the header
pub struct RowSource<R> {
    header: Header,
    records: csv::ByteRecordsIntoIter<R>,
    number: u64,
}

impl<R: Read> RowSource<R> {
    pub fn new(reader: R, delimiter: u8) -> csv::Result<Self> {
        let mut records = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .from_reader(reader)
            .into_byte_records();

        let (header, number) = match records.next().transpose()? {
            Some(record) => (Header::from_record(&record), 1),
            None => (Header::default(), 0),
        };
        debug!("Read header: {header:?}");
        Ok(Self {
            header,
            records,
            number,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }
}

impl<R: Read> Iterator for RowSource<R> {
    type Item = csv::Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = match self.records.next()? {
            Ok(record) => record,
            Err(e) => return Some(Err(e)),
        };
        self.number += 1;
        if std::str::from_utf8(record.as_slice()).is_err() {
            warn!(
                "CSV record {} is not valid UTF-8, undecodable bytes are replaced",
                self.number
            );
        }
        Some(Ok(Row::new(self.number, self.header.zip(&record))))
    }
}
