//! TableRegistry: 桌台订单的唯一权威状态
//!
//! ```text
//! CommandProcessor
//!       │ create / update / transfer / close
//!       ▼
//! TableRegistry
//!   ├── slots: table_number → Arc<Mutex<TableSlot>>   (开台时创建，空台即移除)
//!   │     └── 每次修改：加锁 → validator → 提交 → 发送 RegistryEvent → 移除空 slot → 解锁
//!   └── events: UnboundedSender<RegistryEvent>
//!         │  (锁内发送，同一桌台的事件顺序 = 提交顺序)
//!         ▼
//!   BroadcastDispatcher
//! ```
//!
//! # 锁顺序
//!
//! - 单桌操作只锁一个 slot
//! - transfer 按桌号升序锁两个 slot
//! - list_open 持有 topology 写锁，再按桌号升序锁全部 slot，得到一致的切面
//! - 插入新 slot 只持有 topology 读锁，且此时不持有任何 slot 锁
//!
//! 任何时候都不在持有 DashMap 引用时去锁 slot。
//!
//! # Slot 回收
//!
//! slot 变空（close、transfer 的源桌台、失败的开台）时，在持锁状态下标记 `retired`
//! 并从 map 中移除。拿到 retired slot 的操作重新解析桌号。

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use shared::message::{TableOrderClosedPayload, TableTransferredPayload};
use shared::order::{LineItem, TableNumber, TableOrder};
use shared::ServerEvent;
use tokio::sync::mpsc;

use super::error::{OrderError, OrderResult};
use super::money::{MAX_ITEMS_PER_ORDER, check_line_item, order_total};
use super::validator::{self, CloseConfirmation};

#[cfg(test)]
mod tests;

/// State change committed by the registry
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryEvent {
    Created(TableOrder),
    Updated(TableOrder),
    Transferred {
        source: TableNumber,
        target: TableNumber,
        order: TableOrder,
    },
    Closed {
        table: TableNumber,
        sequence: u64,
    },
}

impl RegistryEvent {
    pub fn table_number(&self) -> TableNumber {
        match self {
            RegistryEvent::Created(order) | RegistryEvent::Updated(order) => order.table_number,
            RegistryEvent::Transferred { target, .. } => *target,
            RegistryEvent::Closed { table, .. } => *table,
        }
    }
}

impl From<RegistryEvent> for ServerEvent {
    fn from(event: RegistryEvent) -> Self {
        match event {
            RegistryEvent::Created(order) => ServerEvent::TableOrderCreated(order),
            RegistryEvent::Updated(order) => ServerEvent::TableOrderUpdated(order),
            RegistryEvent::Transferred {
                source,
                target,
                order,
            } => ServerEvent::TableTransferred(TableTransferredPayload {
                source_table: source,
                target_table: target,
                order,
            }),
            RegistryEvent::Closed { table, sequence } => {
                ServerEvent::TableOrderClosed(TableOrderClosedPayload {
                    table_number: table,
                    sequence,
                })
            }
        }
    }
}

/// Result of a committed transfer
#[derive(Debug, Clone, PartialEq)]
pub struct TransferOutcome {
    /// 被清空的源桌台
    pub vacated: TableNumber,
    /// 目标桌台上的新订单
    pub order: TableOrder,
}

#[derive(Debug, Default)]
struct TableSlot {
    order: Option<TableOrder>,
    /// 已从 map 中移除，持有者需要重新解析
    retired: bool,
}

type SlotRef = Arc<Mutex<TableSlot>>;

pub struct TableRegistry {
    slots: DashMap<TableNumber, SlotRef>,
    /// 读：插入 slot；写：list_open 取切面
    topology: RwLock<()>,
    events: mpsc::UnboundedSender<RegistryEvent>,
}

impl std::fmt::Debug for TableRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableRegistry")
            .field("slots", &self.slots.len())
            .finish()
    }
}

impl TableRegistry {
    /// Create an empty registry and the receiving end of its event stream
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RegistryEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                slots: DashMap::new(),
                topology: RwLock::new(()),
                events: tx,
            },
            rx,
        )
    }

    /// 获取或创建 slot（DashMap 引用在返回前释放）
    fn slot(&self, table: TableNumber) -> SlotRef {
        if let Some(slot) = self.existing_slot(table) {
            return slot;
        }
        let _topology = self.topology.read();
        self.slots.entry(table).or_default().value().clone()
    }

    /// 获取已存在的 slot，不创建
    fn existing_slot(&self, table: TableNumber) -> Option<SlotRef> {
        self.slots.get(&table).map(|entry| entry.value().clone())
    }

    /// 锁住 `table` 当前有效的 slot 并执行 `f`，之后回收空 slot
    ///
    /// `create == false` 且桌台没有 slot 时返回 NotFound。
    fn with_slot<R>(
        &self,
        table: TableNumber,
        create: bool,
        f: impl FnOnce(&mut TableSlot) -> OrderResult<R>,
    ) -> OrderResult<R> {
        loop {
            let slot = if create {
                self.slot(table)
            } else {
                self.existing_slot(table).ok_or(OrderError::NotFound(table))?
            };
            let mut guard = slot.lock();
            if guard.retired {
                continue;
            }
            let result = f(&mut *guard);
            self.retire_if_vacant(table, &slot, &mut *guard);
            return result;
        }
    }

    /// 空 slot 从 map 中移除（调用方持有该 slot 的锁）
    fn retire_if_vacant(&self, table: TableNumber, slot: &SlotRef, guard: &mut TableSlot) {
        if guard.order.is_some() || guard.retired {
            return;
        }
        guard.retired = true;
        self.slots.remove_if(&table, |_, current| Arc::ptr_eq(current, slot));
    }

    fn emit(&self, event: RegistryEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("Registry event receiver dropped, event discarded");
        }
    }

    // ========== Mutations ==========

    pub fn create(
        &self,
        table: TableNumber,
        items: Vec<LineItem>,
        start_time: DateTime<Utc>,
    ) -> OrderResult<TableOrder> {
        let order = self.with_slot(table, true, |slot| {
            let order = validator::validate_create(table, slot.order.as_ref(), items, start_time)?;
            slot.order = Some(order.clone());
            self.emit(RegistryEvent::Created(order.clone()));
            Ok(order)
        })?;

        tracing::info!(table, total = %order.total, items = order.items.len(), "Table opened");
        Ok(order)
    }

    pub fn update(
        &self,
        table: TableNumber,
        items: Vec<LineItem>,
        expected_sequence: Option<u64>,
    ) -> OrderResult<TableOrder> {
        let order = self.with_slot(table, false, |slot| {
            let order =
                validator::validate_update(table, slot.order.as_ref(), items, expected_sequence)?;
            slot.order = Some(order.clone());
            self.emit(RegistryEvent::Updated(order.clone()));
            Ok(order)
        })?;

        tracing::info!(table, sequence = order.sequence, total = %order.total, "Table order updated");
        Ok(order)
    }

    /// Move the whole open order from `source` to `target`
    ///
    /// 两个 slot 按桌号升序加锁；提交后源桌台为空并被回收，目标桌台 sequence = 1。
    pub fn transfer(&self, source: TableNumber, target: TableNumber) -> OrderResult<TransferOutcome> {
        if source == target {
            return Err(OrderError::malformed(format!(
                "sourceTable and targetTable must differ (both {source})"
            )));
        }
        // 源桌台未开台时不为目标桌台创建 slot
        if self.get(source).is_none() {
            return Err(OrderError::NotFound(source));
        }

        let order = loop {
            let source_slot = self.existing_slot(source).ok_or(OrderError::NotFound(source))?;
            let target_slot = self.slot(target);

            let (low, high) = if source < target {
                (&source_slot, &target_slot)
            } else {
                (&target_slot, &source_slot)
            };
            let mut low_guard = low.lock();
            let mut high_guard = high.lock();
            let (src, dst) = if source < target {
                (&mut *low_guard, &mut *high_guard)
            } else {
                (&mut *high_guard, &mut *low_guard)
            };
            if src.retired || dst.retired {
                // 重新解析前回收本轮可能新建的空目标 slot
                self.retire_if_vacant(source, &source_slot, src);
                self.retire_if_vacant(target, &target_slot, dst);
                continue;
            }

            let result =
                validator::validate_transfer(source, src.order.as_ref(), target, dst.order.as_ref());
            if let Ok(order) = &result {
                src.order = None;
                dst.order = Some(order.clone());
                self.emit(RegistryEvent::Transferred {
                    source,
                    target,
                    order: order.clone(),
                });
            }
            self.retire_if_vacant(source, &source_slot, src);
            self.retire_if_vacant(target, &target_slot, dst);
            break result?;
        };

        tracing::info!(source, target, total = %order.total, "Table transferred");
        Ok(TransferOutcome {
            vacated: source,
            order,
        })
    }

    /// Close and evict the open order of `table`
    pub fn close(&self, table: TableNumber) -> OrderResult<CloseConfirmation> {
        let confirmation = self.with_slot(table, false, |slot| {
            let confirmation = validator::validate_close(table, slot.order.as_ref())?;
            slot.order = None;
            self.emit(RegistryEvent::Closed {
                table,
                sequence: confirmation.sequence,
            });
            Ok(confirmation)
        })?;

        tracing::info!(
            table,
            sequence = confirmation.sequence,
            total = %confirmation.closed.total,
            "Table closed"
        );
        Ok(confirmation)
    }

    // ========== Queries ==========

    pub fn get(&self, table: TableNumber) -> Option<TableOrder> {
        let slot = self.existing_slot(table)?;
        let guard = slot.lock();
        guard.order.clone().filter(TableOrder::is_open)
    }

    /// All open orders, ascending by table number, from one consistent cut
    pub fn list_open(&self) -> Vec<TableOrder> {
        // 写锁期间没有新 slot 插入，transfer 不可能把订单搬到切面之外
        let _topology = self.topology.write();
        let mut slots: Vec<(TableNumber, SlotRef)> = self
            .slots
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        slots.sort_unstable_by_key(|(table, _)| *table);

        let guards: Vec<_> = slots.iter().map(|(_, slot)| slot.lock()).collect();
        guards
            .iter()
            .filter_map(|guard| guard.order.clone())
            .filter(TableOrder::is_open)
            .collect()
    }

    pub fn open_count(&self) -> usize {
        self.list_open().len()
    }

    // ========== Persistence collaborator ==========

    /// Snapshot of every open order for an external store
    pub fn export(&self) -> Vec<TableOrder> {
        self.list_open()
    }

    /// Seed the registry from a previously exported snapshot
    ///
    /// 不产生事件。整批先校验（桌号、重复桌号、明细范围、已开台），全部通过后才写入；
    /// totals 重新计算，已关闭的订单跳过。
    pub fn restore(&self, orders: Vec<TableOrder>) -> OrderResult<usize> {
        let mut seen = HashSet::new();
        let mut batch = Vec::with_capacity(orders.len());
        for mut order in orders {
            if order.table_number == 0 {
                return Err(OrderError::malformed("tableNumber must be a positive integer"));
            }
            if !order.is_open() {
                continue;
            }
            if !seen.insert(order.table_number) {
                return Err(OrderError::malformed(format!(
                    "table {} appears twice in snapshot",
                    order.table_number
                )));
            }
            if order.items.len() > MAX_ITEMS_PER_ORDER {
                return Err(OrderError::malformed(format!(
                    "table {} has too many items ({})",
                    order.table_number,
                    order.items.len()
                )));
            }
            order.items.iter().try_for_each(check_line_item)?;
            order.total = order_total(&order.items)?;
            order.sequence = order.sequence.max(1);
            if self.get(order.table_number).is_some() {
                return Err(OrderError::AlreadyOpen(order.table_number));
            }
            batch.push(order);
        }

        let restored = batch.len();
        for order in batch {
            let table = order.table_number;
            self.with_slot(table, true, |slot| {
                if slot.order.as_ref().is_some_and(TableOrder::is_open) {
                    return Err(OrderError::AlreadyOpen(table));
                }
                slot.order = Some(order);
                Ok(())
            })?;
        }
        tracing::info!(restored, "Registry restored from snapshot");
        Ok(restored)
    }
}
