pub mod emit;

// Публичный экспорт всех типов ошибок из вложенных модулей.
pub use emit::*;
