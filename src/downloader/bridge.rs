use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use thiserror::Error;
use tracing::debug;

/// Mensaje seguro que sustituye a cualquier error que filtre estado interno
/// del planificador de tareas.
const SAFE_MESSAGE: &str = "Error procesando la descarga. Inténtalo de nuevo más tarde.";

/// Marcadores de representaciones internas que nunca deben llegar al usuario
const INTERNAL_MARKERS: [&str; 4] = ["joinerror", "future", "poll", "panicked"];

/// Fallo del puente síncrono, ya normalizado para consumo del usuario
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("no se pudo crear el runtime de descarga: {0}")]
    Runtime(std::io::Error),
    #[error("{0}")]
    Panicked(String),
}

/// Ejecuta exactamente un future hasta completarse sobre un runtime propio
/// de un solo uso.
///
/// Cada invocación construye su runtime, lo usa para esa única operación y
/// lo destruye al salir: ningún contexto de ejecución se comparte entre
/// llamadas ni entre llamadores concurrentes, así que una descarga colgada
/// jamás contamina a la siguiente. Un pánico dentro del future se captura y
/// se normaliza en [`BridgeError::Panicked`] en lugar de tumbar el hilo.
pub fn run_to_completion<F, T>(fut: F) -> Result<T, BridgeError>
where
    F: Future<Output = T>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(BridgeError::Runtime)?;

    debug!("🌉 Runtime de un solo uso creado para el fetch");
    let result = catch_unwind(AssertUnwindSafe(|| runtime.block_on(fut)));

    // Desmontar el runtime antes de devolver: las conexiones del fetcher
    // quedan cerradas en todas las salidas, también en la de error
    drop(runtime);

    result.map_err(|payload| BridgeError::Panicked(sanitize_panic(payload)))
}

/// Reescribe mensajes que exponen artefactos internos (tareas sin resolver,
/// estado del runtime) en un mensaje apto para el usuario.
pub fn sanitize_message(message: &str) -> String {
    let lowered = message.to_lowercase();
    if INTERNAL_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        SAFE_MESSAGE.to_string()
    } else {
        message.to_string()
    }
}

fn sanitize_panic(payload: Box<dyn std::any::Any + Send>) -> String {
    let message = if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        return SAFE_MESSAGE.to_string();
    };

    sanitize_message(&message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_runs_single_future_to_completion() {
        let result = run_to_completion(async { 40 + 2 });
        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn test_supports_suspension_points() {
        let result = run_to_completion(async {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            "listo"
        });
        assert_eq!(result.unwrap(), "listo");
    }

    #[test]
    fn test_each_invocation_gets_fresh_runtime() {
        // Dos llamadas seguidas no comparten estado de ejecución
        assert_eq!(run_to_completion(async { 1 }).unwrap(), 1);
        assert_eq!(run_to_completion(async { 2 }).unwrap(), 2);
    }

    #[test]
    fn test_panic_is_captured_and_sanitized() {
        let result: Result<(), _> = run_to_completion(async {
            panic!("`Future` interno sin resolver en poll");
        });

        let message = result.unwrap_err().to_string();
        assert_eq!(message, SAFE_MESSAGE);
    }

    #[test]
    fn test_sanitize_rewrites_internal_artifacts() {
        assert_eq!(sanitize_message("JoinError::Panic(...)"), SAFE_MESSAGE);
        assert_eq!(sanitize_message("the future is not ready"), SAFE_MESSAGE);
    }

    #[test]
    fn test_sanitize_keeps_ordinary_messages() {
        assert_eq!(
            sanitize_message("HTTP 404 desde el servidor"),
            "HTTP 404 desde el servidor"
        );
    }

    #[test]
    fn test_inner_error_values_pass_through() {
        let result = run_to_completion(async { Err::<(), _>(anyhow::anyhow!("sin conexión")) });
        let inner = result.unwrap().unwrap_err();
        assert_eq!(inner.to_string(), "sin conexión");
    }
}
