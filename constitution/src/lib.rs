//! Constitutional checks for Voyager prompt updates.
//!
//! Every proposed edit to a community's prompt configuration is reviewed
//! against four principles before it may touch disk:
//!
//! - **Elevation**: the edit raises the quality of guidance users receive
//! - **Transparency**: the assistant stays honest about what it is and knows
//! - **Agency**: users keep ownership of their own decisions
//! - **Growth**: the edit supports the user's long-term development
//!
//! # Key Components
//!
//! - [`Principle`]: One of the four named principles
//! - [`PrincipleVerdict`]: A pass/fail verdict with reviewer reasoning
//! - [`ConstitutionalCheck`]: The full set of four verdicts attached to a proposal
//! - [`CheckOutcome`]: Evaluation of a check, listing failing principles
//!
//! # Example
//!
//! ```ignore
//! use constitution::ConstitutionalCheck;
//!
//! let outcome = proposal.constitutional_check.evaluate();
//! if !outcome.passed() {
//!     return Err(format!("constitutional checks failed: {outcome}"));
//! }
//! ```

pub mod evaluation;
pub mod types;

// Re-export main types
pub use evaluation::CheckOutcome;
pub use types::*;
