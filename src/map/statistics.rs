use super::application::Application;
use super::scatter::{Dot, DotExtractor};
use crate::link::{LinkDataDuplexMap, LinkSample};
use crate::stats::{Accumulate, ResponseHistogramBuilder, ResponseSample};
use crate::window::Range;

/// Everything one span contributes to a map
#[derive(Debug, Clone, PartialEq)]
pub enum MapSample {
    /// Edge seen from the caller's side
    SourceLink(LinkSample),
    /// Edge seen from the callee's side
    TargetLink(LinkSample),
    /// Node response time
    Response(ResponseSample),
    Dot { application: Application, dot: Dot },
}

/// Per-request aggregation state
#[derive(Debug, Clone)]
pub struct MapStatistics {
    link_data_duplex_map: LinkDataDuplexMap,
    response_histogram: ResponseHistogramBuilder,
    dot_extractor: DotExtractor,
}

impl MapStatistics {
    pub fn new(scan_range: Range) -> Self {
        Self {
            link_data_duplex_map: LinkDataDuplexMap::new(),
            response_histogram: ResponseHistogramBuilder::new(),
            dot_extractor: DotExtractor::new(scan_range),
        }
    }

    pub fn link_data_duplex_map(&self) -> &LinkDataDuplexMap {
        &self.link_data_duplex_map
    }

    pub fn response_histogram(&self) -> &ResponseHistogramBuilder {
        &self.response_histogram
    }

    pub fn dot_extractor(&self) -> &DotExtractor {
        &self.dot_extractor
    }

    pub fn into_parts(self) -> (LinkDataDuplexMap, ResponseHistogramBuilder, DotExtractor) {
        (
            self.link_data_duplex_map,
            self.response_histogram,
            self.dot_extractor,
        )
    }
}

impl Accumulate<MapSample> for MapStatistics {
    fn accumulate(&mut self, sample: MapSample) {
        match sample {
            MapSample::SourceLink(link) => self.link_data_duplex_map.add_source_link_data(link),
            MapSample::TargetLink(link) => self.link_data_duplex_map.add_target_link_data(link),
            MapSample::Response(response) => self.response_histogram.accumulate(response),
            MapSample::Dot { application, dot } => {
                self.dot_extractor.add_dot(application, dot);
            }
        }
    }

    fn merge(&mut self, other: Self) {
        self.link_data_duplex_map.merge(other.link_data_duplex_map);
        self.response_histogram.merge(other.response_histogram);
        self.dot_extractor.merge(other.dot_extractor);
    }
}
