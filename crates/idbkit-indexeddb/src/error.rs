//! Conversion of browser errors into engine errors

use idbkit_core::EngineError;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{DomException, Event, IdbRequest, IdbTransaction};

/// Engine error from a DOMException.
pub fn dom_error(e: &DomException) -> EngineError {
    EngineError::new(e.name(), e.message())
}

/// Engine error from an arbitrary thrown JS value.
pub fn js_error(val: &JsValue) -> EngineError {
    if let Some(e) = val.dyn_ref::<DomException>() {
        return dom_error(e);
    }
    if let Some(e) = val.dyn_ref::<js_sys::Error>() {
        return EngineError::new(String::from(e.name()), String::from(e.message()));
    }
    let msg = js_sys::JSON::stringify(val)
        .map(String::from)
        .unwrap_or_else(|_| format!("{:?}", val));
    EngineError::new("Error", msg)
}

/// Error carried by a request.
pub fn request_error(req: &IdbRequest) -> EngineError {
    match req.error() {
        Ok(Some(e)) => dom_error(&e),
        Ok(None) => EngineError::new("UnknownError", "unknown IDB error"),
        Err(e) => js_error(&e),
    }
}

/// Error behind a transaction `error` or `abort` event.
///
/// `error` events bubble up from the failing request, so the request is checked
/// before the transaction itself.
pub fn transaction_error(tx: &IdbTransaction, event: &Event, fallback: &str) -> EngineError {
    let from_request = event
        .target()
        .and_then(|t| t.dyn_into::<IdbRequest>().ok())
        .and_then(|req| req.error().ok().flatten());

    from_request
        .or_else(|| tx.error())
        .map(|e| dom_error(&e))
        .unwrap_or_else(|| EngineError::new(fallback, "transaction error"))
}
