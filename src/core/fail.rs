use std::sync::Mutex;

use crate::core::spec::Failure;

/// Receives every failed assertion raised through a `SpecContext`.
pub trait FailHandler: Send + Sync {
    fn fail(&self, failure: &Failure);
}

/// The runner's own fail handler: remembers the first failure of the
/// running spec until the runner drains it.
#[derive(Debug, Default)]
pub struct Failer {
    current: Mutex<Option<Failure>>,
}

impl Failer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the recorded failure, leaving the failer empty for the next spec.
    pub fn drain(&self) -> Option<Failure> {
        match self.current.lock() {
            Ok(mut current) => current.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}

impl FailHandler for Failer {
    fn fail(&self, failure: &Failure) {
        let mut current = match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if current.is_none() {
            *current = Some(failure.clone());
        }
    }
}
