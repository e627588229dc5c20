//! Per-tick polling registration
//!
//! The consumer calls [`UpdateSignal::emit`] once per frame of its render
//! loop; every player connected to the signal runs its update. The signal
//! only holds weak references, so registration never keeps a player alive.

use super::media_player::MediaPlayer;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

static GLOBAL: Lazy<Arc<UpdateSignal>> = Lazy::new(|| Arc::new(UpdateSignal::default()));

/// Tick source players register with
#[derive(Default)]
pub struct UpdateSignal {
    slots: Mutex<Vec<(u64, Weak<MediaPlayer>)>>,
    next_id: AtomicU64,
}

impl UpdateSignal {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Process-wide signal used by players built without an explicit one
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL)
    }

    pub fn connect(self: &Arc<Self>, player: Weak<MediaPlayer>) -> Connection {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.slots.lock().push((id, player));
        Connection {
            id,
            signal: Arc::downgrade(self),
        }
    }

    /// Update every connected player; returns how many ran
    ///
    /// Must be called from the consumer thread.
    pub fn emit(&self) -> usize {
        let players: Vec<Arc<MediaPlayer>> = {
            let mut slots = self.slots.lock();
            slots.retain(|(_, player)| player.strong_count() > 0);
            slots.iter().filter_map(|(_, player)| player.upgrade()).collect()
        };

        for player in &players {
            player.update();
        }
        players.len()
    }

    pub fn connection_count(&self) -> usize {
        self.slots.lock().len()
    }

    fn disconnect(&self, id: u64) {
        self.slots.lock().retain(|(slot, _)| *slot != id);
    }
}

/// A player's registration; disconnects on drop
pub struct Connection {
    id: u64,
    signal: Weak<UpdateSignal>,
}

impl Connection {
    pub fn is_connected(&self) -> bool {
        self.signal
            .upgrade()
            .map(|signal| signal.slots.lock().iter().any(|(id, _)| *id == self.id))
            .unwrap_or(false)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(signal) = self.signal.upgrade() {
            signal.disconnect(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_drop_disconnects() {
        let signal = UpdateSignal::new();
        let first = signal.connect(Weak::new());
        let second = signal.connect(Weak::new());
        assert_eq!(signal.connection_count(), 2);
        assert!(first.is_connected());

        drop(first);
        assert_eq!(signal.connection_count(), 1);
        assert!(second.is_connected());
    }

    #[test]
    fn test_emit_skips_dead_players() {
        let signal = UpdateSignal::new();
        let connection = signal.connect(Weak::new());
        assert_eq!(signal.emit(), 0);
        // Dead slots are pruned on emit
        assert!(!connection.is_connected());
    }
}
