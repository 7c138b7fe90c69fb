pub mod histogram;
pub mod response;

pub use histogram::{Histogram, LabeledHistogram, TimeSeriesHistogram};
pub use response::{
    ApplicationResponseHistogram, ResponseHistogramBuilder, ResponseHistogramSummary,
    ResponseSample,
};

/// Additive aggregation state.
///
/// Accumulation must be commutative and associative so that partial states
/// built on separate workers can be merged into the same result a single
/// sequential pass would produce.
pub trait Accumulate<S> {
    /// Fold one sample into this state
    fn accumulate(&mut self, sample: S);

    /// Merge another partial state into this one (for parallel aggregation)
    fn merge(&mut self, other: Self)
    where
        Self: Sized;
}
