//! MACD crossover strategy.
//!
//! Bullish cross goes long. Bearish cross goes short under
//! [`ExitPolicy::Reverse`] or flat under [`ExitPolicy::FlattenOnly`].

use super::{Action, ExitPolicy, Strategy};
use crate::backtest::Direction;
use crate::data::PriceBar;
use crate::indicators::{CrossDirection, CrossoverDetector, CrossoverEvent, MacdState};

pub struct MacdCrossStrategy {
    events: Vec<CrossoverEvent>,
    cursor: usize,
    policy: ExitPolicy,
}

impl MacdCrossStrategy {
    pub fn new(state: &MacdState, policy: ExitPolicy) -> Self {
        Self::from_events(CrossoverDetector::detect(state).collect(), policy)
    }

    /// Events must be in ascending index order.
    pub fn from_events(events: Vec<CrossoverEvent>, policy: ExitPolicy) -> Self {
        Self {
            events,
            cursor: 0,
            policy,
        }
    }

    pub fn events(&self) -> &[CrossoverEvent] {
        &self.events
    }

    fn event_at(&mut self, index: usize) -> Option<CrossDirection> {
        while let Some(event) = self.events.get(self.cursor) {
            if event.index > index {
                return None;
            }
            self.cursor += 1;
            if event.index == index {
                return Some(event.direction);
            }
        }
        None
    }
}

impl Strategy for MacdCrossStrategy {
    fn name(&self) -> &str {
        "macd_crossover"
    }

    fn on_bar(&mut self, index: usize, _bar: &PriceBar, position: Direction) -> Action {
        match (self.event_at(index), self.policy) {
            (Some(CrossDirection::Bullish), _) => Action::OpenLong,
            (Some(CrossDirection::Bearish), ExitPolicy::Reverse) => Action::OpenShort,
            (Some(CrossDirection::Bearish), ExitPolicy::FlattenOnly) => {
                if position == Direction::Long {
                    Action::Close
                } else {
                    Action::Hold
                }
            }
            (None, _) => Action::Hold,
        }
    }
}
