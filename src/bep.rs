//! Build event stream messages and the length-delimited log reader.
//!
//! Only the part of `build_event_stream.proto` the harvester looks at is
//! declared here; prost skips every other field while decoding. Tags match
//! the upstream schema so real Bazel logs decode unchanged.

use crate::error::DriverError;
use anyhow::Result;
use prost::Message;

#[derive(Clone, PartialEq, Message)]
pub struct BuildEvent {
    #[prost(message, optional, tag = "1")]
    pub id: Option<BuildEventId>,
    #[prost(message, optional, tag = "8")]
    pub completed: Option<TargetComplete>,
    #[prost(message, optional, tag = "15")]
    pub named_set_of_files: Option<NamedSetOfFiles>,
}

#[derive(Clone, PartialEq, Message)]
pub struct BuildEventId {
    #[prost(message, optional, tag = "5")]
    pub target_completed: Option<TargetCompletedId>,
    #[prost(message, optional, tag = "13")]
    pub named_set: Option<NamedSetOfFilesId>,
}

#[derive(Clone, PartialEq, Message)]
pub struct TargetCompletedId {
    #[prost(string, tag = "1")]
    pub label: String,
    #[prost(string, tag = "2")]
    pub aspect: String,
}

#[derive(Clone, PartialEq, Eq, Hash, Message)]
pub struct NamedSetOfFilesId {
    #[prost(string, tag = "1")]
    pub id: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct TargetComplete {
    #[prost(bool, tag = "1")]
    pub success: bool,
    #[prost(message, repeated, tag = "2")]
    pub output_group: Vec<OutputGroup>,
}

#[derive(Clone, PartialEq, Message)]
pub struct OutputGroup {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, repeated, tag = "3")]
    pub file_sets: Vec<NamedSetOfFilesId>,
}

#[derive(Clone, PartialEq, Message)]
pub struct NamedSetOfFiles {
    #[prost(message, repeated, tag = "1")]
    pub files: Vec<File>,
    #[prost(message, repeated, tag = "2")]
    pub file_sets: Vec<NamedSetOfFilesId>,
}

#[derive(Clone, PartialEq, Message)]
pub struct File {
    #[prost(string, tag = "1")]
    pub name: String,
}

/// Iterates over the events of a binary build event log.
///
/// Each record is a varint length followed by that many bytes of encoded
/// `BuildEvent`. The first malformed record yields an error and ends the
/// iteration.
pub struct EventReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> EventReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn fail(&mut self, message: String) -> Option<Result<BuildEvent>> {
        self.data = &[];
        Some(Err(DriverError::Decode(message).into()))
    }
}

impl Iterator for EventReader<'_> {
    type Item = Result<BuildEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.is_empty() {
            return None;
        }
        let mut rest = self.data;
        let len = match prost::decode_length_delimiter(&mut rest) {
            Ok(len) => len,
            Err(err) => {
                let offset = self.offset;
                return self.fail(format!("read length prefix at offset {offset}: {err}"));
            }
        };
        let prefix_len = self.data.len() - rest.len();
        if len > rest.len() {
            let (offset, available) = (self.offset, rest.len());
            return self.fail(format!(
                "record at offset {offset} declares {len} bytes, only {available} remain"
            ));
        }
        let (record, rest) = rest.split_at(len);
        let event = match BuildEvent::decode(record) {
            Ok(event) => event,
            Err(err) => {
                let offset = self.offset;
                return self.fail(format!("decode record at offset {offset}: {err}"));
            }
        };
        self.offset += prefix_len + len;
        self.data = rest;
        Some(Ok(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named_set(id: &str, files: &[&str]) -> BuildEvent {
        BuildEvent {
            id: Some(BuildEventId {
                named_set: Some(NamedSetOfFilesId { id: id.to_string() }),
                ..Default::default()
            }),
            named_set_of_files: Some(NamedSetOfFiles {
                files: files
                    .iter()
                    .map(|name| File {
                        name: name.to_string(),
                    })
                    .collect(),
                file_sets: Vec::new(),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn reads_consecutive_records() {
        let mut log = Vec::new();
        named_set("0", &["a.json"]).encode_length_delimited(&mut log).unwrap();
        named_set("1", &["b.json", "c.json"])
            .encode_length_delimited(&mut log)
            .unwrap();
        let events: Vec<BuildEvent> = EventReader::new(&log).collect::<Result<_>>().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].named_set_of_files.as_ref().unwrap().files.len(), 2);
    }

    #[test]
    fn truncated_record_is_decode_error() {
        let mut log = Vec::new();
        named_set("0", &["a.json"]).encode_length_delimited(&mut log).unwrap();
        log.truncate(log.len() - 2);
        let err = EventReader::new(&log).next().unwrap().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DriverError>(),
            Some(DriverError::Decode(_))
        ));
    }

    #[test]
    fn unreadable_length_prefix_stops_iteration() {
        let log = [0xff_u8, 0xff, 0xff];
        let mut reader = EventReader::new(&log);
        assert!(reader.next().unwrap().is_err());
        assert!(reader.next().is_none());
    }
}
