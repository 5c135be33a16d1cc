//! Стратегии исполнения эмиссии.
//!
//! Исполнитель получает список совпавших записей и решает, сколько из них
//! и в каком порядке вызвать. Каждый вызов проходит через
//! [`Invoker`](crate::pubsub::Invoker), который учитывает лимиты, фильтры,
//! сигнал прерывания и политику ошибок.
//!
//! - `broadcast`: все записи независимо (по умолчанию).
//! - `race`: все записи, в ответе только первый завершившийся.
//! - `balance`: одна запись с наименьшим числом вызовов.
//! - `pick`: одна запись по позиции (`First`, `Last`) или случайно (`Random`).
//! - `series`: записи по одной со сверткой результатов.
//! - `waterfall`: результат шага становится полезной нагрузкой следующего.

pub mod balance;
pub mod broadcast;
pub mod pick;
pub mod race;
pub mod series;
pub mod waterfall;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, EnumIter, EnumString};
use vestnik_error::EmitResult;

pub use balance::Balance;
pub use broadcast::Broadcast;
pub use pick::{First, Last, Random};
pub use race::Race;
pub use series::{Series, StepErrorPolicy};
pub use waterfall::Waterfall;

use crate::pubsub::{EmitArgs, Invoker, ListenerEntry, Message, Outcome};

/// Аргументы одного запуска исполнителя.
#[derive(Clone, Copy)]
pub struct ExecutorCall<'a> {
    pub entries: &'a [Arc<ListenerEntry>],
    pub message: &'a Message,
    pub args: &'a EmitArgs,
    pub invoker: &'a Invoker,
}

impl ExecutorCall<'_> {
    /// Вызывает одну запись с сообщением и аргументами эмиссии.
    pub fn invoke(
        &self,
        entry: &Arc<ListenerEntry>,
    ) -> EmitResult<Option<Outcome>> {
        self.invoker.invoke(entry, self.message, self.args)
    }
}

/// Стратегия исполнения.
pub trait Executor: Send + Sync + 'static {
    fn execute(
        &self,
        call: ExecutorCall<'_>,
    ) -> EmitResult<Vec<Outcome>>;
}

impl<F> Executor for F
where
    F: for<'a> Fn(ExecutorCall<'a>) -> EmitResult<Vec<Outcome>> + Send + Sync + 'static,
{
    fn execute(
        &self,
        call: ExecutorCall<'_>,
    ) -> EmitResult<Vec<Outcome>> {
        self(call)
    }
}

pub type ExecutorRef = Arc<dyn Executor>;

/// Встроенные исполнители по имени (для конфигурации).
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    AsRefStr,
    EnumIter,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ExecutorKind {
    #[default]
    Broadcast,
    Race,
    Balance,
    First,
    Last,
    Random,
    Series,
    Waterfall,
}

impl ExecutorKind {
    /// Исполнитель с параметрами по умолчанию.
    pub fn build(self) -> ExecutorRef {
        match self {
            Self::Broadcast => Arc::new(Broadcast),
            Self::Race => Arc::new(Race),
            Self::Balance => Arc::new(Balance),
            Self::First => Arc::new(First),
            Self::Last => Arc::new(Last),
            Self::Random => Arc::new(Random),
            Self::Series => Arc::new(Series::default()),
            Self::Waterfall => Arc::new(Waterfall),
        }
    }
}

impl From<ExecutorKind> for ExecutorRef {
    fn from(kind: ExecutorKind) -> Self {
        kind.build()
    }
}
