use serde::Deserialize;
use serde::Serialize;

/// Position of an entry in the log
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct LogId {
    pub index: u64,
    pub term: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub index: u64,
    pub term: u64,
    pub payload: EntryPayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryPayload {
    /// Written by a new leader so earlier-term entries can commit through it
    Noop,
    Command(ClientCommand),
}

/// A client command as stored in the log
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientCommand {
    pub client_id: String,
    pub sequence: u64,
    pub data: Vec<u8>,
}

impl Entry {
    pub fn noop(
        index: u64,
        term: u64,
    ) -> Self {
        Self {
            index,
            term,
            payload: EntryPayload::Noop,
        }
    }

    pub fn command(
        index: u64,
        term: u64,
        command: ClientCommand,
    ) -> Self {
        Self {
            index,
            term,
            payload: EntryPayload::Command(command),
        }
    }

    pub fn log_id(&self) -> LogId {
        LogId {
            index: self.index,
            term: self.term,
        }
    }

    pub fn is_noop(&self) -> bool {
        matches!(self.payload, EntryPayload::Noop)
    }

    pub fn client_command(&self) -> Option<&ClientCommand> {
        match &self.payload {
            EntryPayload::Command(c) => Some(c),
            EntryPayload::Noop => None,
        }
    }

    /// True if this entry carries `sequence` of `client_id`
    pub fn is_request_of(
        &self,
        client_id: &str,
        sequence: u64,
    ) -> bool {
        self.client_command()
            .map(|c| c.client_id == client_id && c.sequence == sequence)
            .unwrap_or(false)
    }
}
