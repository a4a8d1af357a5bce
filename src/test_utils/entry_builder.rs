use crate::proto::common::ClientCommand;
use crate::proto::common::Entry;

/// Builds consecutive entries of one term
pub struct EntryBuilder {
    index: u64,
    term: u64,
}

impl EntryBuilder {
    pub fn new(
        start_index: u64,
        term: u64,
    ) -> Self {
        Self {
            index: start_index,
            term,
        }
    }

    pub fn command(
        mut self,
        client_id: &str,
        sequence: u64,
    ) -> (Self, Entry) {
        let entry = Entry::command(
            self.index,
            self.term,
            ClientCommand {
                client_id: client_id.to_string(),
                sequence,
                data: format!("{}-{}", client_id, sequence).into_bytes(),
            },
        );
        self.index += 1;
        (self, entry)
    }

    pub fn noop(mut self) -> (Self, Entry) {
        let entry = Entry::noop(self.index, self.term);
        self.index += 1;
        (self, entry)
    }

    /// `count` commands of client "c" with sequences starting at the index
    pub fn commands(
        self,
        count: u64,
    ) -> Vec<Entry> {
        let mut builder = self;
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let sequence = builder.index;
            let (next, entry) = builder.command("c", sequence);
            builder = next;
            entries.push(entry);
        }
        entries
    }
}

/// One entry per listed term, starting at index 1
pub fn entries_with_terms(terms: &[u64]) -> Vec<Entry> {
    terms
        .iter()
        .enumerate()
        .map(|(i, term)| {
            let (_, entry) = EntryBuilder::new(i as u64 + 1, *term).command("c", i as u64 + 1);
            entry
        })
        .collect()
}
