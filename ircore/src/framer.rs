//! Line Framer, §4.D: turns a raw byte stream into a sequence of complete lines,
//! preserving partial lines across reads.
//!
//! Fixes the known bug in `original_source/src/connection.c`'s `_conn_recv_data`
//! (spec.md §9a): that C implementation *overwrites* its carry buffer on every
//! read that ends without an LF, silently dropping the previous read's bytes if
//! two no-LF reads happen back to back. This framer *appends* to carry instead.

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Chunk {
    pub bytes: Vec<u8>,
    pub ends_with_eol: bool,
}

#[derive(Debug, Default)]
pub struct Framer {
    queue: std::collections::VecDeque<Chunk>,
    carry: Vec<u8>,
}

impl Framer {
    pub fn new() -> Self {
        Framer::default()
    }

    /// Feeds freshly read bytes into the framer. Call once per successful
    /// nonblocking read; call `end_of_tick` once after the last read of a tick.
    pub fn feed(&mut self, data: &[u8]) {
        let mut start = 0;
        for (i, &b) in data.iter().enumerate() {
            if b == b'\n' {
                let line_end = i + 1;
                let mut bytes = Vec::new();
                if let Some(back) = self.queue.back() {
                    if !back.ends_with_eol {
                        bytes.extend_from_slice(&self.queue.pop_back().unwrap().bytes);
                    }
                }
                bytes.extend_from_slice(&self.carry);
                self.carry.clear();
                bytes.extend_from_slice(&data[start..line_end]);
                self.queue.push_back(Chunk {
                    bytes,
                    ends_with_eol: true,
                });
                start = line_end;
            }
        }
        if start < data.len() {
            // No LF found past `start`: append, never replace, to the carry.
            self.carry.extend_from_slice(&data[start..]);
        }
    }

    /// Call once after the last read of a tick. If bytes remain in `carry`, they
    /// become a pending (`!ends_with_eol`) tail entry.
    pub fn end_of_tick(&mut self) {
        if !self.carry.is_empty() {
            self.queue.push_back(Chunk {
                bytes: std::mem::take(&mut self.carry),
                ends_with_eol: false,
            });
        }
    }

    /// Pops the next complete line, if any. A pending tail entry is never
    /// returned — it sits at the queue's tail until a following `feed` completes
    /// it.
    pub fn pop_line(&mut self) -> Option<Vec<u8>> {
        match self.queue.front() {
            Some(chunk) if chunk.ends_with_eol => Some(self.queue.pop_front().unwrap().bytes),
            _ => None,
        }
    }

    /// Number of complete lines currently queued, poppable without blocking on
    /// a future `feed`. Used by the pool to report newly arrived message counts.
    pub fn complete_line_count(&self) -> usize {
        self.queue.iter().filter(|c| c.ends_with_eol).count()
    }

    #[cfg(test)]
    fn pending_carry(&self) -> &[u8] {
        &self.carry
    }
}
