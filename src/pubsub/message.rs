use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

/// Метаданные сообщения.
pub type Meta = Map<String, Value>;

/// Сообщение, доставляемое слушателям.
///
/// `meta` — результат глубокого слияния метаданных движка по умолчанию и
/// метаданных конкретной эмиссии. Пустое слияние хранится как `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub topic: String,
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

impl Message {
    pub fn new(
        topic: impl Into<String>,
        payload: impl Into<Value>,
    ) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            meta: None,
        }
    }

    /// Устанавливает метаданные; пустая карта превращается в `None`.
    pub fn with_meta(
        mut self,
        meta: Meta,
    ) -> Self {
        self.meta = (!meta.is_empty()).then_some(meta);
        self
    }

    /// Десериализует полезную нагрузку в конкретный тип.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }

    /// Значение метаданных по ключу.
    pub fn meta_value(
        &self,
        key: &str,
    ) -> Option<&Value> {
        self.meta.as_ref().and_then(|meta| meta.get(key))
    }
}

/// Глубоко сливает метаданные по умолчанию с метаданными вызова.
///
/// Объекты сливаются рекурсивно по ключам, любое другое значение из `extra`
/// заменяет значение по умолчанию. Пустой результат возвращается как `None`.
pub fn merge_meta(
    defaults: Option<&Meta>,
    extra: Option<Meta>,
) -> Option<Meta> {
    let merged = match (defaults, extra) {
        (None, None) => return None,
        (Some(defaults), None) => defaults.clone(),
        (None, Some(extra)) => extra,
        (Some(defaults), Some(extra)) => {
            let mut merged = defaults.clone();
            deep_merge(&mut merged, extra);
            merged
        }
    };
    (!merged.is_empty()).then_some(merged)
}

fn deep_merge(
    target: &mut Meta,
    source: Meta,
) {
    for (key, value) in source {
        match (target.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                deep_merge(existing, incoming);
            }
            (_, value) => {
                target.insert(key, value);
            }
        }
    }
}
