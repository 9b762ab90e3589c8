//! The per-peer identity exchange.
//!
//! ```text
//!           begin            conclude
//!   Idle ----------> Challenged -------> Verified
//!    ^                 |    ^     \
//!    |                 +----+      +---> Failed
//!    |               begin (replaces
//!    |               the nonce)
//!    +------ reset (from any state) -------+
//! ```

use core::fmt;

/// The outcome of a concluded exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    /// The peer proved knowledge of the group secret.
    Verified,
    /// The response did not match the challenge.
    Failed,
}

/// The externally visible state of an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExchangeState {
    /// No challenge outstanding.
    Idle,
    /// A nonce has been sent and the response is pending.
    Challenged,
    /// Concluded; the peer has to be [`reset`](`Exchange::reset`) before a new round.
    Concluded(Verdict),
}

/// Misuse of the exchange state machine.
#[derive(displaydoc::Display, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeError {
    /// the exchange has already concluded ({0:?}) and has to be reset first
    Concluded(Verdict),
    /// no identity scheme has been negotiated with the peer
    NoScheme,
    /// the local keys do not support the negotiated scheme
    MissingKey,
}

impl core::error::Error for ExchangeError {}

/// A single challenge/response round with one peer, holding the outstanding nonce.
pub struct Exchange<C> {
    state: State<C>,
}

enum State<C> {
    Idle,
    Challenged(C),
    Concluded(Verdict),
}

impl<C> Exchange<C> {
    /// Creates an idle exchange.
    pub fn new() -> Self {
        Self { state: State::Idle }
    }

    /// The current state.
    pub fn state(&self) -> ExchangeState {
        match self.state {
            State::Idle => ExchangeState::Idle,
            State::Challenged(_) => ExchangeState::Challenged,
            State::Concluded(verdict) => ExchangeState::Concluded(verdict),
        }
    }

    /// The nonce awaiting a response, if any.
    pub fn outstanding(&self) -> Option<&C> {
        match &self.state {
            State::Challenged(challenge) => Some(challenge),
            _ => None,
        }
    }

    /// Records a freshly sent challenge.
    ///
    /// An outstanding challenge is replaced; its response will no longer be accepted.
    pub fn begin(&mut self, challenge: C) -> Result<(), ExchangeError> {
        match self.state {
            State::Concluded(verdict) => return Err(ExchangeError::Concluded(verdict)),
            State::Challenged(_) => tracing::debug!("Replacing the outstanding challenge"),
            State::Idle => {}
        }
        self.state = State::Challenged(challenge);
        Ok(())
    }

    /// Checks a response against the outstanding challenge.
    ///
    /// Returns `None` (leaving the state untouched) if no challenge is outstanding.
    pub fn conclude(&mut self, verify: impl FnOnce(&C) -> bool) -> Option<Verdict> {
        let State::Challenged(challenge) = &self.state else {
            tracing::trace!("Unexpected response dropped");
            return None;
        };
        let verdict = if verify(challenge) {
            Verdict::Verified
        } else {
            Verdict::Failed
        };
        self.state = State::Concluded(verdict);
        Some(verdict)
    }

    /// Returns to `Idle`, forgetting any outstanding challenge or verdict.
    pub fn reset(&mut self) {
        self.state = State::Idle;
    }
}

impl<C> Default for Exchange<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for Exchange<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exchange").field("state", &self.state()).finish()
    }
}
