use crate::{apps::tokenize, apps::MapReduceApp, KeyValue};

/// Cuenta ocurrencias de cada palabra.
/// map emite (palabra, "1") por ocurrencia; reduce suma los valores.
pub struct WordCount;

impl MapReduceApp for WordCount {
    fn map(&self, _file: &str, contents: &str) -> Vec<KeyValue> {
        tokenize(contents)
            .map(|word| KeyValue::new(word, "1"))
            .collect()
    }

    fn reduce(&self, _key: &str, values: &[String]) -> String {
        // valores que no son números cuentan como 0
        values
            .iter()
            .map(|v| v.parse::<u64>().unwrap_or(0))
            .sum::<u64>()
            .to_string()
    }
}
