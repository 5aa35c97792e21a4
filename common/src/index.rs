use std::collections::BTreeSet;

use crate::{apps::tokenize, apps::MapReduceApp, KeyValue};

/// Índice invertido: para cada palabra, en cuántos documentos aparece y
/// cuáles son. Salida: "<n> doc1,doc2,..." con documentos ordenados.
pub struct InvertedIndex;

impl MapReduceApp for InvertedIndex {
    fn map(&self, file: &str, contents: &str) -> Vec<KeyValue> {
        // una sola emisión por (palabra, documento)
        let words: BTreeSet<String> = tokenize(contents).collect();
        words
            .into_iter()
            .map(|word| KeyValue::new(word, file))
            .collect()
    }

    fn reduce(&self, _key: &str, values: &[String]) -> String {
        let docs: BTreeSet<&str> = values.iter().map(String::as_str).collect();
        let list: Vec<&str> = docs.into_iter().collect();
        format!("{} {}", list.len(), list.join(","))
    }
}
