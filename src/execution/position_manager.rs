use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

use super::stop_loss::{CloseReason, PositionState, StopContext, StopDecision, StopLossEngine, StopMethod};
use crate::error::PositionError;
use crate::models::{PositionSide, TradeOutcomeSample};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub id: Uuid,
    pub symbol: String,
    pub side: PositionSide,
    pub entry_price: f64,
    pub quantity: f64,
    /// Share of capital approved by sizing
    pub size_fraction: f64,
    pub entry_time: DateTime<Utc>,
    pub highest_price: f64,
    pub lowest_price: f64,
    pub last_price: f64,
    pub stop_price: f64,
    pub stop_method: StopMethod,
    pub take_profit: Option<f64>,
    pub state: PositionState,
    pub realized_pnl: Option<f64>,
    pub exit_price: Option<f64>,
    pub exit_time: Option<DateTime<Utc>>,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }

    pub fn notional(&self) -> f64 {
        self.entry_price * self.quantity
    }

    /// Return at `price`, positive when the position is in profit
    pub fn profit_ratio(&self, price: f64) -> f64 {
        self.side.sign() * (price - self.entry_price) / self.entry_price
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.side.sign() * (price - self.entry_price) * self.quantity
    }

    /// Most favorable price seen since entry
    pub fn best_price(&self) -> f64 {
        match self.side {
            PositionSide::Long => self.highest_price,
            PositionSide::Short => self.lowest_price,
        }
    }

    pub fn peak_profit_ratio(&self) -> f64 {
        self.profit_ratio(self.best_price())
    }

    fn outcome(&self, exit_price: f64, closed_at: DateTime<Utc>) -> TradeOutcomeSample {
        let mut sample = TradeOutcomeSample::new(
            self.symbol.clone(),
            self.side,
            self.entry_price,
            exit_price,
            self.notional(),
            (closed_at - self.entry_time).num_minutes(),
            closed_at,
        );
        // One outcome per position keeps ledger recording idempotent
        sample.id = self.id;
        sample
    }
}

/// Open positions keyed by id, plus a bounded archive of closed ones
pub struct PositionManager {
    open: HashMap<Uuid, Position>,
    by_symbol: HashMap<String, Uuid>,
    archive: VecDeque<Position>,
    archive_capacity: usize,
    hard_max_loss_pct: f64,
    total_pnl: f64,
    protection_mode: bool,
}

impl PositionManager {
    pub fn new(hard_max_loss_pct: f64, archive_capacity: usize) -> Self {
        let archive_capacity = archive_capacity.max(1);
        Self {
            open: HashMap::new(),
            by_symbol: HashMap::new(),
            archive: VecDeque::with_capacity(archive_capacity),
            archive_capacity,
            hard_max_loss_pct,
            total_pnl: 0.0,
            protection_mode: false,
        }
    }

    /// Realized P&L of every position closed by this manager
    pub fn total_pnl(&self) -> f64 {
        self.total_pnl
    }

    /// Open a position using the current time
    pub fn open_position(
        &mut self,
        symbol: String,
        side: PositionSide,
        entry_price: f64,
        quantity: f64,
        size_fraction: f64,
    ) -> Result<Uuid, PositionError> {
        self.open_position_at(symbol, side, entry_price, quantity, size_fraction, None)
    }

    /// Open a position with explicit timestamp (for replay)
    pub fn open_position_at(
        &mut self,
        symbol: String,
        side: PositionSide,
        entry_price: f64,
        quantity: f64,
        size_fraction: f64,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<Uuid, PositionError> {
        if !entry_price.is_finite() || entry_price <= 0.0 {
            return Err(PositionError::InvalidPrice(entry_price));
        }
        if self.has_open_position(&symbol) {
            return Err(PositionError::DuplicateOpen(symbol));
        }

        let id = Uuid::new_v4();
        // Hard max loss until the first tick
        let stop_price = entry_price * (1.0 - side.sign() * self.hard_max_loss_pct);

        tracing::info!(
            "Opened {:?} {} @ ${:.4} (qty {:.4}, {:.2}% of capital, stop ${:.4})",
            side,
            symbol,
            entry_price,
            quantity,
            size_fraction * 100.0,
            stop_price
        );

        self.by_symbol.insert(symbol.clone(), id);
        self.open.insert(
            id,
            Position {
                id,
                symbol,
                side,
                entry_price,
                quantity,
                size_fraction,
                entry_time: timestamp.unwrap_or_else(Utc::now),
                highest_price: entry_price,
                lowest_price: entry_price,
                last_price: entry_price,
                stop_price,
                stop_method: StopMethod::Fixed,
                take_profit: None,
                state: PositionState::Active,
                realized_pnl: None,
                exit_price: None,
                exit_time: None,
            },
        );

        Ok(id)
    }

    pub fn set_take_profit(&mut self, position_id: Uuid, target: f64) -> Result<(), PositionError> {
        if !target.is_finite() || target <= 0.0 {
            return Err(PositionError::InvalidPrice(target));
        }
        self.get_open_mut(position_id)?.take_profit = Some(target);
        Ok(())
    }

    pub fn has_open_position(&self, symbol: &str) -> bool {
        self.by_symbol.contains_key(symbol)
    }

    pub fn get_open_position(&self, symbol: &str) -> Option<&Position> {
        self.by_symbol.get(symbol).and_then(|id| self.open.get(id))
    }

    pub fn is_open(&self, position_id: Uuid) -> bool {
        self.open.contains_key(&position_id)
    }

    /// Open position, or an archived one while it is still retained
    pub fn get_position(&self, position_id: Uuid) -> Result<&Position, PositionError> {
        self.open
            .get(&position_id)
            .or_else(|| self.archive.iter().find(|p| p.id == position_id))
            .ok_or(PositionError::NotFound(position_id))
    }

    fn get_open_mut(&mut self, position_id: Uuid) -> Result<&mut Position, PositionError> {
        if let Some(position) = self.open.get_mut(&position_id) {
            return Ok(position);
        }
        if self.archive.iter().any(|p| p.id == position_id) {
            Err(PositionError::AlreadyClosed(position_id))
        } else {
            Err(PositionError::NotFound(position_id))
        }
    }

    /// Run the stop engine for one tick and archive the position if it closes.
    ///
    /// Returns the realized outcome when the tick closed the position.
    pub fn update_stop_at(
        &mut self,
        position_id: Uuid,
        current_price: f64,
        ctx: &StopContext,
        engine: &StopLossEngine,
    ) -> Result<(StopDecision, Option<TradeOutcomeSample>), PositionError> {
        let position = self.get_open_mut(position_id)?;
        let decision = engine.evaluate(position, current_price, ctx)?;

        let outcome = match decision.closed {
            Some(reason) => Some(self.close_position_at(
                position_id,
                current_price,
                reason,
                Some(ctx.now),
            )?),
            None => None,
        };

        Ok((decision, outcome))
    }

    /// Close and archive a position
    pub fn close_position(
        &mut self,
        position_id: Uuid,
        exit_price: f64,
        reason: CloseReason,
    ) -> Result<TradeOutcomeSample, PositionError> {
        self.close_position_at(position_id, exit_price, reason, None)
    }

    /// Close with explicit timestamp (for replay)
    pub fn close_position_at(
        &mut self,
        position_id: Uuid,
        exit_price: f64,
        reason: CloseReason,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<TradeOutcomeSample, PositionError> {
        if !exit_price.is_finite() || exit_price <= 0.0 {
            return Err(PositionError::InvalidPrice(exit_price));
        }
        self.get_open_mut(position_id)?;
        let Some(mut position) = self.open.remove(&position_id) else {
            return Err(PositionError::NotFound(position_id));
        };
        self.by_symbol.remove(&position.symbol);

        let pnl = position.unrealized_pnl(exit_price);
        let exit_time = timestamp.unwrap_or_else(Utc::now);

        position.state = PositionState::Closed(reason);
        position.last_price = exit_price;
        position.realized_pnl = Some(pnl);
        position.exit_price = Some(exit_price);
        position.exit_time = Some(exit_time);

        tracing::info!(
            "Closed {} @ ${:.4} ({}): P&L ${:+.2} ({:+.2}%)",
            position.symbol,
            exit_price,
            reason.code(),
            pnl,
            position.profit_ratio(exit_price) * 100.0
        );

        let outcome = position.outcome(exit_price, exit_time);
        self.total_pnl += pnl;
        self.archive(position);
        Ok(outcome)
    }

    /// Close every open position at its last seen price and enter protection mode
    pub fn emergency_close_all(
        &mut self,
        timestamp: Option<DateTime<Utc>>,
    ) -> Vec<TradeOutcomeSample> {
        let open: Vec<(Uuid, f64)> = self
            .open
            .values()
            .map(|p| (p.id, p.last_price))
            .collect();

        tracing::error!("🚨 Emergency close of {} open positions", open.len());

        let mut outcomes = Vec::with_capacity(open.len());
        for (position_id, price) in open {
            match self.close_position_at(position_id, price, CloseReason::Emergency, timestamp) {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => tracing::error!("Emergency close of {} failed: {}", position_id, e),
            }
        }

        self.protection_mode = true;
        outcomes
    }

    pub fn protection_mode(&self) -> bool {
        self.protection_mode
    }

    pub fn clear_protection_mode(&mut self) {
        if self.protection_mode {
            tracing::info!("Protection mode cleared");
        }
        self.protection_mode = false;
    }

    pub fn open_positions(&self) -> Vec<&Position> {
        self.open.values().collect()
    }

    /// Retained closed positions, oldest first
    pub fn closed_positions(&self) -> impl Iterator<Item = &Position> {
        self.archive.iter()
    }

    fn archive(&mut self, position: Position) {
        if self.archive.len() >= self.archive_capacity {
            self.archive.pop_front();
        }
        self.archive.push_back(position);
    }
}
