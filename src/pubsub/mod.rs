//! Подсистема Publish–Subscribe (pub/sub).
//!
//! - `emitter`: движок, регистрация, эмиссия, `wait_for`.
//! - `listener`: трейт слушателя, адаптеры замыканий, параметры регистрации.
//! - `invoker`: единственная точка вызова слушателя.
//! - `outcome`: результаты эмиссии (готовые, отложенные, вложенные).
//! - `args`: аргументы и нормализация вызова `emit`.
//! - `message`: сообщение и слияние метаданных.
//! - `hooks`: хуки жизненного цикла и наблюдатели.
//! - `subscription`: дескриптор регистрации.
//! - `tree`, `retained` (приватные): дерево шаблонов и удержанные сообщения.

pub mod args;
pub mod emitter;
pub mod hooks;
pub mod invoker;
pub mod listener;
pub mod message;
pub mod outcome;
mod retained;
pub mod subscription;
mod tree;

pub use args::*;
pub use emitter::{Emitter, EmitterBuilder, WaitFor};
pub use hooks::{AddDecision, EmitDecision, Hooks, LogObserver, Observer};
pub use invoker::Invoker;
pub use listener::*;
pub use message::*;
pub use outcome::*;
pub use subscription::Subscription;
