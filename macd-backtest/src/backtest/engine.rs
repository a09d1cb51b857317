//! Bar-by-bar backtest simulator.
//!
//! Runs the simulation loop once per bar, in ascending date order:
//! 1. Ask the strategy for an action using data up to this bar's close
//! 2. Execute it at the close (close/flip/open, fees applied)
//! 3. Optionally force-close on the terminal bar
//! 4. Mark to market and record the equity point
//!
//! Sizing is fully invested: every entry spends all available cash (net of
//! fees) at the close of the triggering bar. No leverage, no pyramiding.

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::data::{PriceBar, PriceSeries};
use crate::error::{BacktestError, Result};
use crate::indicators::MacdState;
use crate::strategy::{Action, ExitPolicy, MacdCrossStrategy, Strategy};

use super::commission::FeeModel;
use super::trade::{Direction, Position, Trade};

/// Decimal places kept on position quantities (rounded toward zero).
const QUANTITY_DP: u32 = 12;

/// Configuration for simulator execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Fee model applied to every order.
    pub fees: FeeModel,

    /// What a bearish crossover does.
    pub exit_policy: ExitPolicy,

    /// Close any open position at the terminal bar's close.
    pub close_at_end: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            fees: FeeModel::none(),
            exit_policy: ExitPolicy::Reverse,
            close_at_end: false,
        }
    }
}

/// Cash plus at most one open position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioState {
    pub cash: Decimal,
    pub position: Option<Position>,
}

impl PortfolioState {
    pub fn new(cash: Decimal) -> Self {
        Self {
            cash,
            position: None,
        }
    }

    pub fn direction(&self) -> Direction {
        self.position
            .as_ref()
            .map(|p| p.direction)
            .unwrap_or(Direction::Flat)
    }

    /// Signed value of the open position at `close`.
    pub fn position_value(&self, close: Decimal) -> Option<Decimal> {
        match &self.position {
            Some(p) => p.market_value(close),
            None => Some(Decimal::ZERO),
        }
    }

    /// Mark-to-market equity at `close`.
    pub fn equity(&self, close: Decimal) -> Option<Decimal> {
        self.position_value(close)
            .and_then(|value| self.cash.checked_add(value))
    }
}

/// Per-bar equity snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub index: usize,
    pub date: NaiveDate,
    pub close: Decimal,
    pub equity: Decimal,
    pub cash: Decimal,
    pub position_value: Decimal,
    pub direction: Direction,
    /// Units held after this bar (0 when flat).
    pub quantity: Decimal,
    pub daily_pnl: Decimal,
}

/// Everything a single run produced.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationOutcome {
    pub starting_cash: Decimal,
    pub final_state: PortfolioState,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub total_fees: Decimal,
    /// Entries skipped because nothing remained after fees.
    pub skipped_entries: usize,
}

impl SimulationOutcome {
    pub fn final_equity(&self) -> Decimal {
        self.equity_curve
            .last()
            .map(|p| p.equity)
            .unwrap_or(self.starting_cash)
    }

    pub fn start_date(&self) -> Option<NaiveDate> {
        self.equity_curve.first().map(|p| p.date)
    }

    pub fn end_date(&self) -> Option<NaiveDate> {
        self.equity_curve.last().map(|p| p.date)
    }

    /// Position still open after the terminal bar.
    pub fn open_position(&self) -> Option<&Position> {
        self.final_state.position.as_ref()
    }
}

/// The bar-by-bar simulator.
///
/// One instance per run; parameter sweeps create one per combination.
pub struct BacktestSimulator {
    config: SimulatorConfig,
    portfolio: PortfolioState,
    trades: Vec<Trade>,
    equity_curve: Vec<EquityPoint>,
    starting_cash: Decimal,
    total_fees: Decimal,
    skipped_entries: usize,
}

impl BacktestSimulator {
    pub fn new(config: SimulatorConfig) -> Self {
        Self {
            config,
            starting_cash: Decimal::ZERO,
            portfolio: PortfolioState::new(Decimal::ZERO),
            trades: Vec::new(),
            equity_curve: Vec::new(),
            total_fees: Decimal::ZERO,
            skipped_entries: 0,
        }
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Run the MACD crossover rule over `series`.
    ///
    /// `macd` must have been computed from `series` (same length and dates).
    pub fn run(
        &mut self,
        series: &PriceSeries,
        macd: &MacdState,
        starting_cash: Decimal,
    ) -> Result<SimulationOutcome> {
        if macd.len() != series.len() || macd.dates.first() != series.first_date().as_ref() {
            return Err(BacktestError::config(format!(
                "MACD state ({} bars) does not match price series ({} bars)",
                macd.len(),
                series.len()
            )));
        }
        let mut strategy = MacdCrossStrategy::new(macd, self.config.exit_policy);
        self.run_strategy(series, &mut strategy, starting_cash)
    }

    /// Run any strategy over `series`.
    pub fn run_strategy(
        &mut self,
        series: &PriceSeries,
        strategy: &mut dyn Strategy,
        starting_cash: Decimal,
    ) -> Result<SimulationOutcome> {
        if starting_cash <= Decimal::ZERO {
            return Err(BacktestError::config(format!(
                "starting cash must be positive (got {})",
                starting_cash
            )));
        }
        self.config.fees.validate()?;

        // Convert prices up front so a bad bar aborts before any state changes.
        let closes = series
            .iter()
            .map(close_price)
            .collect::<Result<Vec<_>>>()?;

        self.reset(starting_cash);
        info!(
            "Running {} over {} bars with starting cash {}",
            strategy.name(),
            series.len(),
            starting_cash
        );

        let last = series.len().saturating_sub(1);
        for ((index, bar), &close) in series.iter().enumerate().zip(&closes) {
            let action = strategy.on_bar(index, bar, self.portfolio.direction());
            self.execute(action, index, bar.date, close)?;

            if index == last && self.config.close_at_end && self.portfolio.position.is_some() {
                self.close_position(index, bar.date, close)?;
            }

            self.record(index, bar.date, close)?;
        }

        let outcome = SimulationOutcome {
            starting_cash,
            final_state: self.portfolio.clone(),
            trades: self.trades.clone(),
            equity_curve: self.equity_curve.clone(),
            total_fees: self.total_fees,
            skipped_entries: self.skipped_entries,
        };
        info!(
            "Finished: final equity {}, {} closed trades, position {}",
            outcome.final_equity(),
            outcome.trades.len(),
            self.portfolio.direction().as_str()
        );
        Ok(outcome)
    }

    fn reset(&mut self, starting_cash: Decimal) {
        self.starting_cash = starting_cash;
        self.portfolio = PortfolioState::new(starting_cash);
        self.trades.clear();
        self.equity_curve.clear();
        self.total_fees = Decimal::ZERO;
        self.skipped_entries = 0;
    }

    /// Apply one strategy decision at `close`.
    fn execute(
        &mut self,
        action: Action,
        index: usize,
        date: NaiveDate,
        close: Decimal,
    ) -> Result<()> {
        let current = self.portfolio.direction();
        let target = match action {
            Action::Hold => return Ok(()),
            Action::OpenLong => Direction::Long,
            Action::OpenShort => Direction::Short,
            Action::Close => Direction::Flat,
        };

        if current == target {
            return Ok(());
        }
        if current != Direction::Flat {
            self.close_position(index, date, close)?;
        }
        if target != Direction::Flat {
            self.open_position(target, index, date, close)?;
        }
        Ok(())
    }

    fn open_position(
        &mut self,
        direction: Direction,
        index: usize,
        date: NaiveDate,
        close: Decimal,
    ) -> Result<()> {
        if close <= Decimal::ZERO {
            warn!("Skipping {} entry on {}: close price is {}", direction.as_str(), date, close);
            self.skipped_entries += 1;
            return Ok(());
        }

        let Some(sized) = self.config.fees.max_notional(self.portfolio.cash) else {
            warn!(
                "Skipping {} entry on {}: cash {} does not cover fees",
                direction.as_str(),
                date,
                self.portfolio.cash
            );
            self.skipped_entries += 1;
            return Ok(());
        };

        let Some(quantity) = sized.notional.checked_div(close) else {
            warn!(
                "Skipping {} entry on {}: {} / {} exceeds the decimal range",
                direction.as_str(),
                date,
                sized.notional,
                close
            );
            self.skipped_entries += 1;
            return Ok(());
        };
        let quantity = quantity.round_dp_with_strategy(QUANTITY_DP, RoundingStrategy::ToZero);
        if quantity.is_zero() {
            warn!("Skipping {} entry on {}: quantity rounds to zero", direction.as_str(), date);
            self.skipped_entries += 1;
            return Ok(());
        }

        let notional = quantity
            .checked_mul(close)
            .ok_or_else(|| overflow("entry notional", date))?;
        let fee = sized.total;
        let cash = match direction {
            Direction::Long => notional
                .checked_add(fee)
                .and_then(|cost| self.portfolio.cash.checked_sub(cost)),
            Direction::Short => (notional - fee).checked_add(self.portfolio.cash),
            Direction::Flat => return Ok(()),
        };
        self.portfolio.cash = cash.ok_or_else(|| overflow("cash", date))?;
        self.total_fees += fee;

        debug!(
            "{} open {} {} @ {} (fee {})",
            date,
            direction.as_str(),
            quantity,
            close,
            fee
        );

        self.portfolio.position = Some(Position {
            direction,
            quantity,
            entry_price: close,
            entry_date: date,
            entry_index: index,
            entry_fee: fee,
        });
        Ok(())
    }

    fn close_position(&mut self, index: usize, date: NaiveDate, close: Decimal) -> Result<()> {
        let Some(position) = self.portfolio.position.take() else {
            return Ok(());
        };

        let notional = position
            .quantity
            .checked_mul(close)
            .ok_or_else(|| overflow("exit notional", date))?;
        let fee = self.config.fees.calculate(notional).total;
        let cash = match position.direction {
            Direction::Long => self.portfolio.cash.checked_add(notional - fee),
            Direction::Short => notional
                .checked_add(fee)
                .and_then(|cost| self.portfolio.cash.checked_sub(cost)),
            Direction::Flat => Some(self.portfolio.cash),
        };
        self.portfolio.cash = cash.ok_or_else(|| overflow("cash", date))?;
        self.total_fees += fee;

        let trade = Trade::close(&position, date, index, close, fee);
        debug!(
            "{} close {} {} @ {} (pnl {})",
            date,
            position.direction.as_str(),
            position.quantity,
            close,
            trade.pnl
        );
        self.trades.push(trade);
        Ok(())
    }

    fn record(&mut self, index: usize, date: NaiveDate, close: Decimal) -> Result<()> {
        let position_value = self
            .portfolio
            .position_value(close)
            .ok_or_else(|| overflow("position value", date))?;
        let equity = self
            .portfolio
            .equity(close)
            .ok_or_else(|| overflow("equity", date))?;
        let quantity = self
            .portfolio
            .position
            .as_ref()
            .map(|p| p.quantity)
            .unwrap_or(Decimal::ZERO);
        let prev_equity = self
            .equity_curve
            .last()
            .map(|p| p.equity)
            .unwrap_or(self.starting_cash);
        let daily_pnl = equity
            .checked_sub(prev_equity)
            .ok_or_else(|| overflow("daily P&L", date))?;

        self.equity_curve.push(EquityPoint {
            index,
            date,
            close,
            equity,
            cash: self.portfolio.cash,
            position_value,
            direction: self.portfolio.direction(),
            quantity,
            daily_pnl,
        });
        Ok(())
    }
}

fn overflow(what: &str, date: NaiveDate) -> BacktestError {
    BacktestError::config(format!(
        "{} on {} exceeds the decimal range; use a smaller starting cash",
        what, date
    ))
}

fn close_price(bar: &PriceBar) -> Result<Decimal> {
    Decimal::try_from(bar.close).map_err(|_| {
        BacktestError::MalformedData(format!("close {} on {} is not representable", bar.close, bar.date))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::MacdCalculator;
    use rust_decimal_macros::dec;

    /// Plays back a fixed list of `(bar index, action)` pairs.
    struct Scripted(Vec<(usize, Action)>);

    impl Strategy for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn on_bar(&mut self, index: usize, _bar: &PriceBar, _position: Direction) -> Action {
            self.0
                .iter()
                .find(|(i, _)| *i == index)
                .map(|(_, a)| *a)
                .unwrap_or(Action::Hold)
        }
    }

    fn series(closes: &[f64]) -> PriceSeries {
        PriceSeries::from_closes(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), closes).unwrap()
    }

    fn run_scripted(
        config: SimulatorConfig,
        closes: &[f64],
        script: Vec<(usize, Action)>,
    ) -> SimulationOutcome {
        BacktestSimulator::new(config)
            .run_strategy(&series(closes), &mut Scripted(script), dec!(10000))
            .unwrap()
    }

    /// 5e28, within a factor of two of `Decimal::MAX`.
    fn near_decimal_max() -> Decimal {
        Decimal::from_i128_with_scale(5 * 10i128.pow(28), 0)
    }

    fn wave(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| 100.0 + 10.0 * (i as f64 / 6.0).sin())
            .collect()
    }

    #[test]
    fn test_long_round_trip() {
        let outcome = run_scripted(
            SimulatorConfig::default(),
            &[100.0, 110.0, 120.0],
            vec![(0, Action::OpenLong), (2, Action::Close)],
        );
        assert_eq!(outcome.trades.len(), 1);
        assert_eq!(outcome.trades[0].quantity, dec!(100));
        assert_eq!(outcome.trades[0].pnl, dec!(2000));
        assert_eq!(outcome.final_equity(), dec!(12000));
        assert!(outcome.open_position().is_none());
        assert_eq!(outcome.equity_curve[1].daily_pnl, dec!(1000));
    }

    #[test]
    fn test_short_then_flip_long() {
        let outcome = run_scripted(
            SimulatorConfig::default(),
            &[100.0, 90.0, 120.0],
            vec![(0, Action::OpenShort), (1, Action::OpenLong)],
        );
        assert_eq!(outcome.trades.len(), 1);
        assert_eq!(outcome.trades[0].direction, Direction::Short);
        assert_eq!(outcome.trades[0].pnl, dec!(1000));

        let open = outcome.open_position().unwrap();
        assert!(open.is_long());
        assert_eq!(open.entry_price, dec!(90));

        // 11000 cash reinvested at 90, marked at 120.
        let expected = dec!(11000) * dec!(120) / dec!(90);
        assert!((outcome.final_equity() - expected).abs() < dec!(0.0001));
    }

    #[test]
    fn test_equity_is_cash_plus_position() {
        let prices = wave(80);
        let s = series(&prices);
        let macd = MacdCalculator::compute(&s, 5, 10, 3).unwrap();
        let outcome = BacktestSimulator::new(SimulatorConfig::default())
            .run(&s, &macd, dec!(10000))
            .unwrap();

        assert_eq!(outcome.equity_curve.len(), prices.len());
        assert!(!outcome.trades.is_empty());
        for point in &outcome.equity_curve {
            let held = point.quantity * point.close * point.direction.sign();
            assert_eq!(point.position_value, held);
            assert_eq!(point.equity, point.cash + held);
            if point.direction == Direction::Flat {
                assert_eq!(point.quantity, dec!(0));
            } else {
                assert!(point.quantity > dec!(0));
            }
        }
    }

    #[test]
    fn test_bearish_cross_opens_short_under_reverse() {
        let s = series(&wave(80));
        let macd = MacdCalculator::compute(&s, 5, 10, 3).unwrap();
        let outcome = BacktestSimulator::new(SimulatorConfig::default())
            .run(&s, &macd, dec!(10000))
            .unwrap();

        assert!(outcome.trades.len() >= 2);
        assert!(outcome.trades.iter().any(|t| t.direction == Direction::Short));
        for pair in outcome.trades.windows(2) {
            assert_ne!(pair[0].direction, pair[1].direction);
            // Each flip reopens on the bar the previous trade closed.
            assert_eq!(pair[1].entry_index, pair[0].exit_index);
        }
    }

    #[test]
    fn test_flatten_only_never_goes_short() {
        let s = series(&wave(80));
        let macd = MacdCalculator::compute(&s, 5, 10, 3).unwrap();
        let config = SimulatorConfig {
            exit_policy: ExitPolicy::FlattenOnly,
            ..SimulatorConfig::default()
        };
        let outcome = BacktestSimulator::new(config).run(&s, &macd, dec!(10000)).unwrap();

        assert!(!outcome.trades.is_empty());
        assert!(outcome.trades.iter().all(|t| t.direction == Direction::Long));
        assert!(outcome
            .equity_curve
            .iter()
            .all(|p| p.direction != Direction::Short));
    }

    #[test]
    fn test_entry_skipped_when_quantity_exceeds_decimal_range() {
        let config = SimulatorConfig::default();
        let outcome = BacktestSimulator::new(config)
            .run_strategy(
                &series(&[0.5, 0.6]),
                &mut Scripted(vec![(0, Action::OpenLong)]),
                near_decimal_max(),
            )
            .unwrap();
        assert_eq!(outcome.skipped_entries, 1);
        assert!(outcome.open_position().is_none());
        assert_eq!(outcome.final_equity(), near_decimal_max());
    }

    #[test]
    fn test_mark_to_market_overflow_is_an_error() {
        let err = BacktestSimulator::new(SimulatorConfig::default())
            .run_strategy(
                &series(&[1.0, 2.0]),
                &mut Scripted(vec![(0, Action::OpenLong)]),
                near_decimal_max(),
            )
            .unwrap_err();
        assert!(matches!(err, BacktestError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_runs_are_deterministic() {
        let s = series(&wave(60));
        let macd = MacdCalculator::compute(&s, 5, 10, 3).unwrap();
        let config = SimulatorConfig {
            fees: FeeModel::new(dec!(0.001)),
            ..SimulatorConfig::default()
        };
        let a = BacktestSimulator::new(config.clone())
            .run(&s, &macd, dec!(10000))
            .unwrap();
        let b = BacktestSimulator::new(config)
            .run(&s, &macd, dec!(10000))
            .unwrap();
        assert_eq!(a.equity_curve, b.equity_curve);
        assert_eq!(a.trades, b.trades);
    }

    #[test]
    fn test_flat_prices_never_trade() {
        let s = series(&[100.0; 20]);
        let macd = MacdCalculator::compute(&s, 5, 10, 3).unwrap();
        let outcome = BacktestSimulator::new(SimulatorConfig::default())
            .run(&s, &macd, dec!(10000))
            .unwrap();
        assert!(outcome.trades.is_empty());
        assert!(outcome.open_position().is_none());
        assert!(outcome.equity_curve.iter().all(|p| p.equity == dec!(10000)));
    }

    #[test]
    fn test_uptrend_goes_long_and_profits() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let s = series(&closes);
        let macd = MacdCalculator::compute(&s, 5, 10, 3).unwrap();
        let outcome = BacktestSimulator::new(SimulatorConfig::default())
            .run(&s, &macd, dec!(10000))
            .unwrap();
        assert!(outcome.open_position().unwrap().is_long());
        assert!(outcome.final_equity() > dec!(10000));
    }

    #[test]
    fn test_fees_reduce_equity() {
        let outcome = run_scripted(
            SimulatorConfig {
                fees: FeeModel::new(dec!(0.01)),
                ..SimulatorConfig::default()
            },
            &[100.0, 100.0],
            vec![(0, Action::OpenLong), (1, Action::Close)],
        );
        let trade = &outcome.trades[0];
        assert_eq!(trade.gross_pnl, dec!(0));
        assert!(trade.fees > dec!(0));
        assert_eq!(trade.pnl, -trade.fees);
        assert_eq!(outcome.total_fees, trade.fees);
        assert!(outcome.final_equity() < dec!(10000));
    }

    #[test]
    fn test_close_at_end() {
        let config = SimulatorConfig {
            close_at_end: true,
            ..SimulatorConfig::default()
        };
        let outcome = run_scripted(config, &[100.0, 105.0], vec![(0, Action::OpenLong)]);
        assert_eq!(outcome.trades.len(), 1);
        assert!(outcome.open_position().is_none());
        assert_eq!(outcome.final_equity(), dec!(10500));
        assert_eq!(outcome.equity_curve[1].direction, Direction::Flat);
    }

    #[test]
    fn test_open_position_reported_without_close_at_end() {
        let outcome = run_scripted(
            SimulatorConfig::default(),
            &[100.0, 105.0],
            vec![(0, Action::OpenLong)],
        );
        assert!(outcome.trades.is_empty());
        assert_eq!(outcome.open_position().unwrap().quantity, dec!(100));
        assert_eq!(outcome.final_equity(), dec!(10500));
    }

    #[test]
    fn test_entry_skipped_when_fees_exceed_cash() {
        let config = SimulatorConfig {
            fees: FeeModel::none().with_fixed(dec!(20000)),
            ..SimulatorConfig::default()
        };
        let outcome = run_scripted(config, &[100.0, 105.0], vec![(0, Action::OpenLong)]);
        assert_eq!(outcome.skipped_entries, 1);
        assert!(outcome.open_position().is_none());
        assert_eq!(outcome.final_equity(), dec!(10000));
    }

    #[test]
    fn test_non_positive_cash_rejected() {
        let err = BacktestSimulator::new(SimulatorConfig::default())
            .run_strategy(&series(&[100.0]), &mut Scripted(vec![]), dec!(0))
            .unwrap_err();
        assert!(matches!(err, BacktestError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_mismatched_macd_state_rejected() {
        let long = series(&wave(40));
        let short = series(&wave(20));
        let macd = MacdCalculator::compute(&short, 5, 10, 3).unwrap();
        let err = BacktestSimulator::new(SimulatorConfig::default())
            .run(&long, &macd, dec!(10000))
            .unwrap_err();
        assert!(matches!(err, BacktestError::InvalidConfiguration(_)));
    }
}
