//! Flat CSV files of records keyed by (channel, id)
//!
//! Each line is `channel,id,field...`. The file is read completely when the
//! store is opened and only written back on [`RecordStore::flush`], which
//! replaces the file atomically and in sorted order.

use larder_util::{ChannelKey, RecordId};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::{StoreError, StoreResult};

/// Converts between record values and their CSV fields
pub trait RecordCodec {
    type Value;

    /// Build a value from the fields that follow the channel and id
    fn deserialize(
        &self,
        channel: &ChannelKey,
        id: &RecordId,
        fields: &[String],
    ) -> StoreResult<Self::Value>;

    /// Produce the fields written after the channel and id
    fn serialize(&self, value: &Self::Value) -> StoreResult<Vec<String>>;
}

/// Result of a flush
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// The file was replaced with this many records
    Written(usize),
    /// Nothing was written because the table is empty
    RefusedEmpty,
}

/// In-memory table of records backed by a CSV file
pub struct RecordStore<C: RecordCodec> {
    path: PathBuf,
    codec: C,
    channels: BTreeMap<ChannelKey, BTreeMap<RecordId, C::Value>>,
}

impl<C: RecordCodec> RecordStore<C> {
    /// Open the store, loading whatever the file holds.
    ///
    /// A missing or unreadable file gives an empty store. Bad lines are
    /// skipped; a malformed file stops loading but keeps what was read.
    pub fn open(path: impl Into<PathBuf>, codec: C) -> Self {
        let mut store = Self {
            path: path.into(),
            codec,
            channels: BTreeMap::new(),
        };
        store.load();
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn get(&self, channel: &ChannelKey, id: &RecordId) -> Option<&C::Value> {
        self.channels.get(channel)?.get(id)
    }

    pub fn get_mut(&mut self, channel: &ChannelKey, id: &RecordId) -> Option<&mut C::Value> {
        self.channels.get_mut(channel)?.get_mut(id)
    }

    pub fn contains(&self, channel: &ChannelKey, id: &RecordId) -> bool {
        self.get(channel, id).is_some()
    }

    /// Insert a record, returning the value it replaced
    pub fn insert(
        &mut self,
        channel: impl Into<ChannelKey>,
        id: impl Into<RecordId>,
        value: C::Value,
    ) -> Option<C::Value> {
        self.channels
            .entry(channel.into())
            .or_default()
            .insert(id.into(), value)
    }

    pub fn remove(&mut self, channel: &ChannelKey, id: &RecordId) -> Option<C::Value> {
        let ids = self.channels.get_mut(channel)?;
        let value = ids.remove(id);
        if ids.is_empty() {
            self.channels.remove(channel);
        }
        value
    }

    /// All records in ascending (channel, id) order
    pub fn iter(&self) -> impl Iterator<Item = (&ChannelKey, &RecordId, &C::Value)> {
        self.channels
            .iter()
            .flat_map(|(channel, ids)| ids.iter().map(move |(id, v)| (channel, id, v)))
    }

    /// Records belonging to one channel
    pub fn channel(&self, channel: &ChannelKey) -> impl Iterator<Item = (&RecordId, &C::Value)> {
        self.channels.get(channel).into_iter().flat_map(|ids| ids.iter())
    }

    pub fn keys(&self) -> Vec<(ChannelKey, RecordId)> {
        self.iter()
            .map(|(channel, id, _)| (channel.clone(), id.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.channels.values().map(|ids| ids.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.values().all(|ids| ids.is_empty())
    }

    pub fn clear(&mut self) {
        self.channels.clear();
    }

    /// Write every record to the file, replacing it atomically.
    ///
    /// An empty table is never written, so a failed load followed by a
    /// flush cannot wipe the file.
    pub fn flush(&self) -> StoreResult<FlushOutcome> {
        if self.is_empty() {
            warn!(path = %self.path.display(), "Refusing to write blank record file");
            return Ok(FlushOutcome::RefusedEmpty);
        }

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)?;

        let mut count = 0;
        {
            let mut writer = csv::WriterBuilder::new()
                .flexible(true)
                .from_writer(&mut tmp);

            for (channel, id, value) in self.iter() {
                let fields = self.codec.serialize(value)?;
                let mut row = Vec::with_capacity(fields.len() + 2);
                row.push(channel.as_str().to_string());
                row.push(id.to_string());
                row.extend(fields);
                writer.write_record(&row)?;
                count += 1;
            }

            writer.flush()?;
        }

        tmp.as_file_mut().flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| StoreError::Io(e.error))?;

        debug!(path = %self.path.display(), count, "Record file written");
        Ok(FlushOutcome::Written(count))
    }

    /// Flush, then drop every record from memory
    pub fn close(&mut self) -> StoreResult<FlushOutcome> {
        let outcome = self.flush()?;
        self.clear();
        Ok(outcome)
    }

    fn load(&mut self) {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Couldn't open record file");
                return;
            }
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(file);

        let mut record = csv::StringRecord::new();
        loop {
            match reader.read_record(&mut record) {
                Ok(false) => break,
                Ok(true) => {
                    let line = record.position().map(|p| p.line()).unwrap_or(0);
                    if let Err(e) = self.load_record(&record) {
                        warn!(path = %self.path.display(), line, "Invalid record line");
                        debug!(line, error = %e, "Record line rejected");
                    }
                }
                Err(e) => {
                    let line = e.position().map(|p| p.line()).unwrap_or(0);
                    warn!(
                        path = %self.path.display(),
                        line,
                        "Invalid record line, stopping load"
                    );
                    debug!(line, error = %e, "Record file unreadable past this point");
                    break;
                }
            }
        }

        info!(path = %self.path.display(), count = self.len(), "Record file loaded");
    }

    fn load_record(&mut self, record: &csv::StringRecord) -> StoreResult<()> {
        let (channel, id) = match (record.get(0), record.get(1)) {
            (Some(channel), Some(id)) => (ChannelKey::new(channel), RecordId::parse(id)),
            _ => {
                return Err(StoreError::Serialization(
                    "expected channel and id fields".into(),
                ));
            }
        };

        let fields: Vec<String> = record.iter().skip(2).map(String::from).collect();
        let value = self.codec.deserialize(&channel, &id, &fields)?;
        self.insert(channel, id, value);
        Ok(())
    }
}
