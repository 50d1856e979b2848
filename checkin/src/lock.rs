//! The scan lock: at most one check-in attempt in flight.
//!
//! The lock lives inside `ScannerState` and is only touched from the reducer,
//! which the store runs under its write lock. Checking and taking it is one
//! synchronous step, so there is no window between "camera fired" and "lock
//! set" for a second frame to slip through.

/// Identifies one release of the lock
///
/// The cooldown timer started by a release carries this token back. If the
/// lock has been acquired again since, the token is stale and the timer does
/// nothing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CooldownToken(u64);

impl CooldownToken {
    /// Raw generation number, for logs
    #[must_use]
    pub const fn generation(self) -> u64 {
        self.0
    }
}

/// Locked flag plus the payload of the last accepted scan
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanLock {
    locked: bool,
    last_seen: Option<String>,
    generation: u64,
}

impl ScanLock {
    /// Unlocked, with no recent payload
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock for `raw`
    ///
    /// Returns `false` and changes nothing if the lock is already held.
    #[must_use]
    pub fn acquire(&mut self, raw: &str) -> bool {
        if self.locked {
            return false;
        }
        self.locked = true;
        self.last_seen = Some(raw.to_owned());
        self.generation = self.generation.wrapping_add(1);
        true
    }

    /// Drop the lock but keep `last_seen` until the cooldown expires
    pub fn release(&mut self) -> CooldownToken {
        self.locked = false;
        CooldownToken(self.generation)
    }

    /// Forget `last_seen` if nothing was acquired since `token` was issued
    ///
    /// Returns whether it was cleared.
    pub fn expire_cooldown(&mut self, token: CooldownToken) -> bool {
        if self.locked || token.0 != self.generation {
            return false;
        }
        self.last_seen = None;
        true
    }

    /// Back to a fresh lock, used when the scanner closes
    pub fn reset(&mut self) {
        self.locked = false;
        self.last_seen = None;
        self.generation = self.generation.wrapping_add(1);
    }

    /// Whether an attempt currently holds the lock
    #[must_use]
    pub const fn is_locked(&self) -> bool {
        self.locked
    }

    /// Payload of the most recent accepted scan, while its cooldown lasts
    #[must_use]
    pub fn last_seen(&self) -> Option<&str> {
        self.last_seen.as_deref()
    }

    /// Bumped by every acquire and reset
    ///
    /// Read right after a successful acquire, it names that hold of the lock.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }
}
