//! Promise rejection values

use idbkit_core::Error;
use wasm_bindgen::JsValue;

/// Convert a facade error into the value a promise rejects with.
///
/// Quota exhaustion rejects with the bare `"Reach maximum quota"` string so
/// callers can tell it apart from every other failure, which rejects with a JS
/// `Error` carrying the native name and message.
pub(crate) fn reject(err: Error) -> JsValue {
    match err {
        Error::QuotaExceeded => JsValue::from_str(&Error::QuotaExceeded.to_string()),
        Error::Open(e) => named_error(&e.name, &e.message),
        Error::Transaction { name, message, .. } => named_error(&name, &message),
        other => js_sys::Error::new(&other.to_string()).into(),
    }
}

fn named_error(name: &str, message: &str) -> JsValue {
    let error = js_sys::Error::new(message);
    error.set_name(name);
    error.into()
}

#[cfg(all(test, target_arch = "wasm32"))]
mod tests {
    use super::*;
    use idbkit_core::{EngineError, Failure, Signal};
    use wasm_bindgen::JsCast;
    use wasm_bindgen_test::*;

    #[wasm_bindgen_test]
    fn test_quota_rejects_with_bare_string() {
        let value = reject(Error::QuotaExceeded);
        assert_eq!(value.as_string().as_deref(), Some("Reach maximum quota"));
    }

    #[wasm_bindgen_test]
    fn test_transaction_failure_keeps_native_name() {
        let failure = Failure::new(Signal::Abort, EngineError::new("AbortError", "aborted"));
        let value = reject(Error::from(failure));

        assert!(value.as_string().is_none());
        let error = value.dyn_into::<js_sys::Error>().unwrap();
        assert_eq!(String::from(error.name()), "AbortError");
        assert_eq!(String::from(error.message()), "aborted");
    }
}
