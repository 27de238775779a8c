//! Usage accounting.
//!
//! Counters only ever grow. Monetary estimates are derived from an injected
//! [`PriceTable`] and rounded (half-up, four decimals) only when a report is
//! rendered; the raw counters are never rounded.

use crate::session::Session;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Decimal places used for rendered cost estimates.
const COST_DECIMALS: i32 = 4;

/// The kinds of metered consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageKind {
    /// Chat completion tokens.
    Completion,
    /// Seconds of transcribed audio.
    Transcription,
    /// Generated images.
    Image,
}

impl fmt::Display for UsageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completion => f.write_str("completion"),
            Self::Transcription => f.write_str("transcription"),
            Self::Image => f.write_str("image"),
        }
    }
}

/// Monotonically increasing usage counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCounters {
    completion_units: u64,
    transcription_seconds: u64,
    image_count: u64,
}

impl UsageCounters {
    /// Rebuilds counters from persisted values.
    #[must_use]
    pub const fn from_raw(completion_units: u64, transcription_seconds: u64, image_count: u64) -> Self {
        Self {
            completion_units,
            transcription_seconds,
            image_count,
        }
    }

    /// Completion tokens consumed.
    #[must_use]
    pub const fn completion_units(&self) -> u64 {
        self.completion_units
    }

    /// Seconds of audio transcribed.
    #[must_use]
    pub const fn transcription_seconds(&self) -> u64 {
        self.transcription_seconds
    }

    /// Images generated.
    #[must_use]
    pub const fn image_count(&self) -> u64 {
        self.image_count
    }

    /// Returns the counter for a kind.
    #[must_use]
    pub const fn get(&self, kind: UsageKind) -> u64 {
        match kind {
            UsageKind::Completion => self.completion_units,
            UsageKind::Transcription => self.transcription_seconds,
            UsageKind::Image => self.image_count,
        }
    }

    /// Adds `amount` to the counter for `kind`, saturating at `u64::MAX`.
    pub fn record(&mut self, kind: UsageKind, amount: u64) {
        let counter = match kind {
            UsageKind::Completion => &mut self.completion_units,
            UsageKind::Transcription => &mut self.transcription_seconds,
            UsageKind::Image => &mut self.image_count,
        };
        *counter = counter.saturating_add(amount);
    }

    /// Returns the element-wise sum of two counter sets.
    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        Self {
            completion_units: self.completion_units.saturating_add(other.completion_units),
            transcription_seconds: self
                .transcription_seconds
                .saturating_add(other.transcription_seconds),
            image_count: self.image_count.saturating_add(other.image_count),
        }
    }

    /// Sums any number of counter sets.
    pub fn sum<'a>(all: impl IntoIterator<Item = &'a UsageCounters>) -> Self {
        all.into_iter()
            .fold(Self::default(), |total, counters| total.merged(counters))
    }
}

/// Unit prices per usage kind, in dollars.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceTable {
    /// Price of one completion token.
    #[serde(default = "default_completion_per_unit")]
    pub completion_per_unit: f64,
    /// Price of one second of transcribed audio.
    #[serde(default = "default_transcription_per_second")]
    pub transcription_per_second: f64,
    /// Price of one generated image.
    #[serde(default = "default_image_per_unit")]
    pub image_per_unit: f64,
}

fn default_completion_per_unit() -> f64 {
    0.002 / 750.0
}

fn default_transcription_per_second() -> f64 {
    0.006 / 60.0
}

fn default_image_per_unit() -> f64 {
    0.02
}

impl Default for PriceTable {
    fn default() -> Self {
        Self {
            completion_per_unit: default_completion_per_unit(),
            transcription_per_second: default_transcription_per_second(),
            image_per_unit: default_image_per_unit(),
        }
    }
}

impl PriceTable {
    /// Unrounded cost of a counter set.
    #[must_use]
    pub fn cost(&self, counters: &UsageCounters) -> f64 {
        counters.completion_units as f64 * self.completion_per_unit
            + counters.transcription_seconds as f64 * self.transcription_per_second
            + counters.image_count as f64 * self.image_per_unit
    }
}

/// Counters plus their unrounded cost estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UsageReport {
    /// The counters the report covers.
    pub counters: UsageCounters,
    /// Unrounded cost estimate in dollars.
    pub estimated_cost: f64,
}

impl UsageReport {
    /// Cost rounded half-up to four decimal places.
    #[must_use]
    pub fn rounded_cost(&self) -> f64 {
        round_half_up(self.estimated_cost, COST_DECIMALS)
    }

    /// Transcribed minutes rounded half-up to two decimal places.
    #[must_use]
    pub fn transcription_minutes(&self) -> f64 {
        round_half_up(self.counters.transcription_seconds() as f64 / 60.0, 2)
    }

    /// This report's share of `total`, in percent.
    ///
    /// Defined as 0 when the total cost is 0.
    #[must_use]
    pub fn share_of(&self, total: &UsageReport) -> f64 {
        if total.estimated_cost > 0.0 {
            self.estimated_cost / total.estimated_cost * 100.0
        } else {
            0.0
        }
    }
}

/// A requester's usage next to the aggregate over all sessions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UsageStatement {
    /// The requesting session's usage.
    pub requester: UsageReport,
    /// Usage summed over all sessions.
    pub total: UsageReport,
}

impl UsageStatement {
    /// The requester's share of the total cost, in percent.
    #[must_use]
    pub fn share_percent(&self) -> f64 {
        self.requester.share_of(&self.total)
    }

    /// Renders the statement for a chat reply.
    #[must_use]
    pub fn render(&self, display_name: &str) -> String {
        let mine = &self.requester;
        let all = &self.total;
        format!(
            "User: {display_name}\n\
             - Used ~{} tokens for chat completions.\n\
             - Generated {} images.\n\
             - Transcribed {:.2}min of audio.\n\
             \n\
             Total spent: ${:.4} ({:.2}% of total)\n\
             \n\
             Total usage:\n\
             - Chat completion tokens: {}\n\
             - Images generated: {}\n\
             - Audio transcribed: {:.2}min\n\
             \n\
             Total spent: ${:.4}",
            mine.counters.completion_units(),
            mine.counters.image_count(),
            mine.transcription_minutes(),
            mine.rounded_cost(),
            self.share_percent(),
            all.counters.completion_units(),
            all.counters.image_count(),
            all.transcription_minutes(),
            all.rounded_cost(),
        )
    }
}

/// Records usage against sessions and prices it.
#[derive(Debug, Clone, Default)]
pub struct UsageLedger {
    prices: PriceTable,
}

impl UsageLedger {
    /// Creates a ledger with the given price table.
    #[must_use]
    pub fn new(prices: PriceTable) -> Self {
        Self { prices }
    }

    /// Adds `amount` to the session's counter for `kind`.
    pub fn record_usage(&self, session: &mut Session, kind: UsageKind, amount: u64) {
        if amount == 0 {
            return;
        }
        session.usage_mut().record(kind, amount);
        tracing::debug!(
            conversation_id = %session.id(),
            %kind,
            amount,
            "recorded usage"
        );
    }

    /// Reports a single session's usage.
    #[must_use]
    pub fn report(&self, session: &Session) -> UsageReport {
        self.report_counters(*session.usage())
    }

    /// Reports an arbitrary counter set.
    #[must_use]
    pub fn report_counters(&self, counters: UsageCounters) -> UsageReport {
        UsageReport {
            counters,
            estimated_cost: self.prices.cost(&counters),
        }
    }

    /// Sums counters across sessions and reports the total.
    #[must_use]
    pub fn aggregate_report<'a>(&self, all: impl IntoIterator<Item = &'a UsageCounters>) -> UsageReport {
        self.report_counters(UsageCounters::sum(all))
    }

    /// Builds the statement shown by the usage command.
    #[must_use]
    pub fn statement(&self, requester: &Session, totals: UsageCounters) -> UsageStatement {
        UsageStatement {
            requester: self.report(requester),
            total: self.report_counters(totals),
        }
    }
}

/// Rounds a non-negative value half-up to `decimals` places.
fn round_half_up(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    // The epsilon absorbs binary representation error such as 0.00125 * 1e4 = 12.4999...
    let scaled = value * scale;
    let rounded = (scaled + 0.5 + scaled.abs() * f64::EPSILON * 4.0).floor();
    rounded / scale
}
