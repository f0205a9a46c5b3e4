//! Low-level IndexedDB helpers using web-sys
//!
//! Wraps the callback-based IndexedDB API into [`Pending`] values. Each helper
//! registers listeners for every terminal event of a request, transaction or
//! open request; the first one to fire settles the pending value. Listener
//! closures are owned by the pending value and removed when it is dropped.

use std::cell::RefCell;
use std::rc::Rc;

use idbkit_core::{
    settle, EngineError, IndexSchema, KeyPath, Pending, Schema, Settle, Signal, UpgradeEvent,
    UpgradeHook,
};
use tracing::{debug, warn};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{
    Event, EventTarget, IdbDatabase, IdbFactory, IdbOpenDbRequest, IdbRequest, IdbTransaction,
};

use crate::error::{js_error, request_error, transaction_error};

type Handler = Closure<dyn FnMut(Event)>;

/// Get the global IndexedDB factory (window or worker scope).
pub fn idb_factory() -> Result<IdbFactory, idbkit_core::Error> {
    let global = js_sys::global();

    let idb: JsValue = js_sys::Reflect::get(&global, &"indexedDB".into())
        .map_err(|_| idbkit_core::Error::NotAvailable("no indexedDB on global".into()))?;

    if idb.is_undefined() || idb.is_null() {
        return Err(idbkit_core::Error::NotAvailable(
            "indexedDB is null/undefined".into(),
        ));
    }

    idb.dyn_into::<IdbFactory>()
        .map_err(|_| idbkit_core::Error::NotAvailable("indexedDB is not IdbFactory".into()))
}

/// Event listeners attached for the lifetime of one pending value.
#[derive(Default)]
pub(crate) struct Listeners {
    entries: Vec<(EventTarget, &'static str, Handler)>,
}

impl Listeners {
    pub(crate) fn on(
        &mut self,
        target: &EventTarget,
        event: &'static str,
        handler: impl FnMut(Event) + 'static,
    ) -> Result<(), EngineError> {
        let closure = Closure::wrap(Box::new(handler) as Box<dyn FnMut(Event)>);
        target
            .add_event_listener_with_callback(event, closure.as_ref().unchecked_ref())
            .map_err(|e| js_error(&e))?;
        self.entries.push((target.clone(), event, closure));
        Ok(())
    }
}

impl Drop for Listeners {
    fn drop(&mut self) {
        for (target, event, closure) in &self.entries {
            let _ = target.remove_event_listener_with_callback(event, closure.as_ref().unchecked_ref());
        }
    }
}

/// Settle on the request's `success` or `error` event.
///
/// `decode` turns the request's result into the success value.
pub(crate) fn request_pending<T: 'static>(
    req: &IdbRequest,
    decode: impl Fn(JsValue) -> Result<T, EngineError> + 'static,
) -> Pending<T> {
    let (done, pending) = settle::<T>();
    let mut listeners = Listeners::default();

    let on_success = {
        let req = req.clone();
        let done = done.clone();
        move |_event: Event| {
            let outcome = req.result().map_err(|e| js_error(&e)).and_then(&decode);
            match outcome {
                Ok(value) => done.succeed(value),
                Err(e) => done.fail(Signal::Error, e),
            };
        }
    };

    let on_error = {
        let req = req.clone();
        let done = done.clone();
        move |_event: Event| {
            done.fail(Signal::Error, request_error(&req));
        }
    };

    if let Err(e) = listeners
        .on(req, "success", on_success)
        .and_then(|_| listeners.on(req, "error", on_error))
    {
        return Pending::failed(Signal::Error, e);
    }

    pending.keep_alive(listeners)
}

/// Settle when the transaction completes, errors, aborts, or its connection
/// closes.
pub(crate) fn transaction_pending(tx: &IdbTransaction) -> Pending<()> {
    let (done, pending) = settle::<()>();
    let mut listeners = Listeners::default();

    let on_complete = {
        let done = done.clone();
        move |_event: Event| {
            done.succeed(());
        }
    };
    let on_error = terminal(tx, &done, Signal::Error, "UnknownError");
    let on_abort = terminal(tx, &done, Signal::Abort, "AbortError");
    let on_close = {
        let done = done.clone();
        move |_event: Event| {
            done.fail(
                Signal::Close,
                EngineError::new("UnknownError", "the database connection was closed"),
            );
        }
    };

    let db = tx.db();
    let registered = listeners
        .on(tx, "complete", on_complete)
        .and_then(|_| listeners.on(tx, "error", on_error))
        .and_then(|_| listeners.on(tx, "abort", on_abort))
        .and_then(|_| listeners.on(&db, "close", on_close));
    if let Err(e) = registered {
        return Pending::failed(Signal::Error, e);
    }

    pending.keep_alive(listeners)
}

fn terminal(
    tx: &IdbTransaction,
    done: &Settle<()>,
    signal: Signal,
    fallback: &'static str,
) -> impl FnMut(Event) + 'static {
    let tx = tx.clone();
    let done = done.clone();
    move |event: Event| {
        done.fail(signal, transaction_error(&tx, &event, fallback));
    }
}

/// Schema access during `upgradeneeded`.
struct IdbSchema {
    db: IdbDatabase,
    tx: Option<IdbTransaction>,
}

impl Schema for IdbSchema {
    fn table_names(&self) -> Vec<String> {
        let names = self.db.object_store_names();
        (0..names.length()).filter_map(|i| names.item(i)).collect()
    }

    fn has_table(&self, name: &str) -> bool {
        self.db.object_store_names().contains(name)
    }

    fn create_table(&mut self, name: &str, key_path: &KeyPath) -> Result<(), EngineError> {
        let params = web_sys::IdbObjectStoreParameters::new();
        js_sys::Reflect::set(&params, &"keyPath".into(), &key_path.as_str().into())
            .map_err(|e| js_error(&e))?;

        self.db
            .create_object_store_with_optional_parameters(name, &params)
            .map_err(|e| js_error(&e))?;
        Ok(())
    }

    fn create_index(&mut self, table: &str, index: &IndexSchema) -> Result<(), EngineError> {
        let tx = self.tx.as_ref().ok_or_else(|| {
            EngineError::new("InvalidStateError", "no version change transaction")
        })?;
        let store = tx.object_store(table).map_err(|e| js_error(&e))?;

        let params = web_sys::IdbIndexParameters::new();
        js_sys::Reflect::set(&params, &"unique".into(), &JsValue::from_bool(index.unique))
            .map_err(|e| js_error(&e))?;

        store
            .create_index_with_str_and_optional_parameters(
                &index.name,
                index.key_path.as_str(),
                &params,
            )
            .map_err(|e| js_error(&e))?;
        Ok(())
    }
}

/// Open `name` at `version`, running `upgrade` on `upgradeneeded`.
///
/// An error from the hook aborts the version change; the open then rejects with
/// the hook's error rather than the generic abort.
pub(crate) fn open_database(
    factory: &IdbFactory,
    name: &str,
    version: u32,
    upgrade: UpgradeHook,
) -> Pending<IdbDatabase> {
    let open_req: IdbOpenDbRequest = match factory.open_with_u32(name, version) {
        Ok(req) => req,
        Err(e) => return Pending::failed(Signal::Error, js_error(&e)),
    };

    let (done, pending) = settle::<IdbDatabase>();
    let mut listeners = Listeners::default();
    let hook = Rc::new(RefCell::new(Some(upgrade)));
    let hook_error: Rc<RefCell<Option<EngineError>>> = Rc::new(RefCell::new(None));

    let on_upgrade = {
        let req = open_req.clone();
        let hook_error = hook_error.clone();
        let db_name = name.to_string();
        move |event: Event| {
            let Some(upgrade) = hook.borrow_mut().take() else {
                return;
            };
            let db = match req.result().map(|r| r.unchecked_into::<IdbDatabase>()) {
                Ok(db) => db,
                Err(e) => {
                    *hook_error.borrow_mut() = Some(js_error(&e));
                    return;
                }
            };

            let versions = event
                .dyn_ref::<web_sys::IdbVersionChangeEvent>()
                .map(|e| UpgradeEvent {
                    old_version: e.old_version() as u32,
                    new_version: e.new_version().map_or(version, |v| v as u32),
                })
                .unwrap_or(UpgradeEvent {
                    old_version: 0,
                    new_version: version,
                });

            let tx = req.transaction();
            let mut schema = IdbSchema { db, tx: tx.clone() };
            if let Err(e) = upgrade(&mut schema, versions) {
                debug!(db = %db_name, error = %e, "upgrade aborted");
                *hook_error.borrow_mut() = Some(e);
                if let Some(tx) = tx {
                    let _ = tx.abort();
                }
            }
        }
    };

    let on_success = {
        let req = open_req.clone();
        let done = done.clone();
        move |_event: Event| match req.result() {
            Ok(val) => match val.dyn_into::<IdbDatabase>() {
                Ok(db) => {
                    done.succeed(db);
                }
                Err(_) => {
                    done.fail(
                        Signal::Error,
                        EngineError::new("UnknownError", "result is not IdbDatabase"),
                    );
                }
            },
            Err(e) => {
                done.fail(Signal::Error, js_error(&e));
            }
        }
    };

    let on_error = {
        let req = open_req.clone();
        let done = done.clone();
        move |_event: Event| {
            let error = hook_error
                .borrow_mut()
                .take()
                .unwrap_or_else(|| request_error(&req));
            done.fail(Signal::Error, error);
        }
    };

    // Not terminal: the open resumes once the other connections close.
    let db_name = name.to_string();
    let on_blocked = move |_event: Event| {
        warn!(db = %db_name, "open blocked by another connection");
    };

    let registered = listeners
        .on(&open_req, "upgradeneeded", on_upgrade)
        .and_then(|_| listeners.on(&open_req, "success", on_success))
        .and_then(|_| listeners.on(&open_req, "error", on_error))
        .and_then(|_| listeners.on(&open_req, "blocked", on_blocked));
    if let Err(e) = registered {
        return Pending::failed(Signal::Error, e);
    }

    pending.keep_alive(listeners)
}

/// Delete an IndexedDB database by name.
pub(crate) fn delete_database(factory: &IdbFactory, name: &str) -> Pending<()> {
    match factory.delete_database(name) {
        Ok(req) => request_pending(&req, |_| Ok(())),
        Err(e) => Pending::failed(Signal::Error, js_error(&e)),
    }
}
