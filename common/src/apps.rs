use crate::KeyValue;

pub use crate::index::InvertedIndex;
pub use crate::wordcount::WordCount;

/// Funciones de usuario de un job MapReduce.
///
/// Las dos tienen que ser deterministas: un reintento de la misma tarea
/// debe producir los mismos registros. `reduce` recibe los valores en
/// orden de map (ascendente) y luego de llegada dentro de cada partición,
/// pero no puede depender del orden global de las claves.
pub trait MapReduceApp: Send + Sync {
    fn map(&self, file: &str, contents: &str) -> Vec<KeyValue>;
    fn reduce(&self, key: &str, values: &[String]) -> String;
}

/// Nombres aceptados por `app_by_name`.
pub const APP_NAMES: &[&str] = &["wordcount", "index"];

/// Busca una aplicación incluida por nombre (MR_APP / --app).
pub fn app_by_name(name: &str) -> Option<Box<dyn MapReduceApp>> {
    match name {
        "wordcount" | "wc" => Some(Box::new(WordCount)),
        "index" | "ii" => Some(Box::new(InvertedIndex)),
        _ => None,
    }
}

/// Parte el texto en palabras: separa por espacios, deja sólo
/// alfanuméricos y '_' y pasa a minúscula.
pub fn tokenize(contents: &str) -> impl Iterator<Item = String> + '_ {
    contents.split_whitespace().filter_map(|raw| {
        let cleaned: String = raw
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_')
            .collect::<String>()
            .to_lowercase();
        (!cleaned.is_empty()).then_some(cleaned)
    })
}
