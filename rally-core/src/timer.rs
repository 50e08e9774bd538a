//! Countdown timers that generate events for the state machines.
//! Used for the loss settle delay and for acknowledgement timeouts.

struct TimeEntry<Id> {
    id: Id,
    remaining_time: f64,
}

pub struct Timer<Id> {
    list_of_timers: Vec<TimeEntry<Id>>,
}

impl<Id: Copy + PartialEq> Default for Timer<Id> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Id: Copy + PartialEq> Timer<Id> {
    pub fn new() -> Timer<Id> {
        Timer {
            list_of_timers: Vec::new(),
        }
    }

    /// Starts a new timer. If a timer with the id already exists it gets overwritten.
    pub fn start_timer(&mut self, id: Id, remaining_time: f64) {
        self.list_of_timers.retain(|e| e.id != id);
        self.list_of_timers.push(TimeEntry { id, remaining_time });
    }

    /// Kills a timer (if still existing).
    pub fn cancel_timer(&mut self, id: Id) {
        self.list_of_timers.retain(|e| e.id != id);
    }

    /// Drops all timers.
    pub fn clear(&mut self) {
        self.list_of_timers.clear();
    }

    pub fn is_running(&self, id: Id) -> bool {
        self.list_of_timers.iter().any(|e| e.id == id)
    }

    /// Updates and gets the list with the timers that ran out, in the order they were started.
    pub fn update_and_get_list(&mut self, delta_time: f64) -> Vec<Id> {
        let mut result = Vec::new();

        for entry in self.list_of_timers.iter_mut() {
            entry.remaining_time -= delta_time;
            if entry.remaining_time <= 0.0 {
                result.push(entry.id);
            }
        }

        self.list_of_timers.retain(|e| !result.contains(&e.id));

        result
    }
}
