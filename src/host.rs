//! Host API Call Options
//!
//! Platform calls take a structured options value with `success`, `fail` and
//! `complete` callbacks. Failures are only ever delivered through those
//! callbacks. A small in-memory storage and feedback (toast, modal, loading)
//! surface is provided so pages can run against the simulator.

use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::HostError;

// ═══════════════════════════════════════════════════════════════════════════════
// CALL OPTIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Callbacks for one host call. All three default to `None`; `complete`
/// runs after whichever of `success`/`fail` fired.
pub struct CallOptions<T> {
    pub success: Option<Box<dyn FnOnce(T)>>,
    pub fail: Option<Box<dyn FnOnce(HostError)>>,
    pub complete: Option<Box<dyn FnOnce()>>,
}

impl<T> Default for CallOptions<T> {
    fn default() -> Self {
        CallOptions {
            success: None,
            fail: None,
            complete: None,
        }
    }
}

impl<T> CallOptions<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_success(mut self, f: impl FnOnce(T) + 'static) -> Self {
        self.success = Some(Box::new(f));
        self
    }

    pub fn on_fail(mut self, f: impl FnOnce(HostError) + 'static) -> Self {
        self.fail = Some(Box::new(f));
        self
    }

    pub fn on_complete(mut self, f: impl FnOnce() + 'static) -> Self {
        self.complete = Some(Box::new(f));
        self
    }

    /// Deliver a call outcome to the registered callbacks.
    pub fn resolve(self, outcome: Result<T, HostError>) {
        match outcome {
            Ok(value) => {
                if let Some(success) = self.success {
                    success(value);
                }
            }
            Err(e) => {
                log::debug!("host call failed: {}", e);
                if let Some(fail) = self.fail {
                    fail(e);
                }
            }
        }
        if let Some(complete) = self.complete {
            complete();
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STORAGE
// ═══════════════════════════════════════════════════════════════════════════════

/// Key-value storage backing `setStorage` / `getStorage`.
#[derive(Debug, Default, Clone)]
pub struct Storage {
    entries: HashMap<String, Value>,
}

impl Storage {
    pub fn set_storage(&mut self, key: &str, data: Value, options: CallOptions<()>) {
        self.entries.insert(key.to_string(), data);
        options.resolve(Ok(()));
    }

    pub fn get_storage(&self, key: &str, options: CallOptions<Value>) {
        let outcome = self
            .entries
            .get(key)
            .cloned()
            .ok_or_else(|| HostError::StorageMiss(key.to_string()));
        options.resolve(outcome);
    }

    pub fn remove_storage(&mut self, key: &str, options: CallOptions<()>) {
        self.entries.remove(key);
        options.resolve(Ok(()));
    }

    pub fn clear_storage(&mut self, options: CallOptions<()>) {
        self.entries.clear();
        options.resolve(Ok(()));
    }

    pub fn get_storage_sync(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn set_storage_sync(&mut self, key: &str, data: Value) {
        self.entries.insert(key.to_string(), data);
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.keys().cloned().collect();
        keys.sort();
        keys
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FEEDBACK
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToastIcon {
    #[default]
    Success,
    Error,
    Loading,
    None,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToastOptions {
    pub title: String,
    pub icon: ToastIcon,
    pub duration: Duration,
    pub mask: bool,
}

impl ToastOptions {
    pub fn new(title: &str) -> Self {
        ToastOptions {
            title: title.to_string(),
            icon: ToastIcon::default(),
            duration: Duration::from_millis(1500),
            mask: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModalOptions {
    pub title: String,
    pub content: String,
    pub show_cancel: bool,
    pub confirm_text: String,
    pub cancel_text: String,
}

impl Default for ModalOptions {
    fn default() -> Self {
        ModalOptions {
            title: String::new(),
            content: String::new(),
            show_cancel: true,
            confirm_text: "OK".to_string(),
            cancel_text: "Cancel".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModalResult {
    pub confirm: bool,
    pub cancel: bool,
}

struct PendingModal {
    options: ModalOptions,
    callbacks: CallOptions<ModalResult>,
}

/// Toast, modal and loading indicator state.
#[derive(Default)]
pub struct Feedback {
    toast: Option<ToastOptions>,
    modal: Option<PendingModal>,
    loading: Option<String>,
}

impl Feedback {
    pub fn show_toast(&mut self, toast: ToastOptions, options: CallOptions<()>) {
        log::info!("toast: {}", toast.title);
        self.toast = Some(toast);
        options.resolve(Ok(()));
    }

    pub fn hide_toast(&mut self) {
        self.toast = None;
    }

    pub fn toast(&self) -> Option<&ToastOptions> {
        self.toast.as_ref()
    }

    /// Open a modal. Its callbacks fire when the user answers through
    /// `resolve_modal`; a modal still open is cancelled first.
    pub fn show_modal(&mut self, modal: ModalOptions, options: CallOptions<ModalResult>) {
        if let Some(previous) = self.modal.take() {
            previous.callbacks.resolve(Ok(ModalResult {
                confirm: false,
                cancel: true,
            }));
        }
        self.modal = Some(PendingModal {
            options: modal,
            callbacks: options,
        });
    }

    pub fn modal(&self) -> Option<&ModalOptions> {
        self.modal.as_ref().map(|m| &m.options)
    }

    pub fn resolve_modal(&mut self, confirm: bool) -> Result<(), HostError> {
        let pending = self.modal.take().ok_or(HostError::NoModal)?;
        pending.callbacks.resolve(Ok(ModalResult {
            confirm,
            cancel: !confirm,
        }));
        Ok(())
    }

    pub fn show_loading(&mut self, title: &str, options: CallOptions<()>) {
        self.loading = Some(title.to_string());
        options.resolve(Ok(()));
    }

    pub fn hide_loading(&mut self, options: CallOptions<()>) {
        let outcome = self
            .loading
            .take()
            .map(|_| ())
            .ok_or_else(|| HostError::Other("loading indicator is not shown".to_string()));
        options.resolve(outcome);
    }

    pub fn is_loading(&self) -> bool {
        self.loading.is_some()
    }
}

/// Host surface shared by every page of a simulator.
#[derive(Default)]
pub struct Host {
    pub storage: Storage,
    pub feedback: Feedback,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recorder() -> (Rc<RefCell<Vec<String>>>, impl Fn(&str) -> Box<dyn FnOnce()>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let handle = log.clone();
        let make = move |tag: &str| -> Box<dyn FnOnce()> {
            let log = handle.clone();
            let tag = tag.to_string();
            Box::new(move || log.borrow_mut().push(tag))
        };
        (log, make)
    }

    #[test]
    fn test_complete_runs_after_success() {
        let (log, make) = recorder();
        let on_success = make("success");
        let on_complete = make("complete");
        let options = CallOptions::<()>::new()
            .on_success(move |_| on_success())
            .on_complete(on_complete);
        options.resolve(Ok(()));
        assert_eq!(*log.borrow(), vec!["success", "complete"]);
    }

    #[test]
    fn test_storage_miss_goes_to_fail() {
        let (log, make) = recorder();
        let on_fail = make("fail");
        let on_complete = make("complete");
        let storage = Storage::default();
        storage.get_storage(
            "token",
            CallOptions::new()
                .on_success(|_| panic!("unexpected success"))
                .on_fail(move |e| {
                    assert_eq!(e, HostError::StorageMiss("token".to_string()));
                    on_fail()
                })
                .on_complete(on_complete),
        );
        assert_eq!(*log.borrow(), vec!["fail", "complete"]);
    }

    #[test]
    fn test_storage_round_trip() {
        let mut storage = Storage::default();
        storage.set_storage("user", json!({ "id": 9 }), CallOptions::new());
        let seen = Rc::new(RefCell::new(None));
        let sink = seen.clone();
        storage.get_storage(
            "user",
            CallOptions::new().on_success(move |v| *sink.borrow_mut() = Some(v)),
        );
        assert_eq!(*seen.borrow(), Some(json!({ "id": 9 })));

        storage.clear_storage(CallOptions::new());
        assert!(storage.get_storage_sync("user").is_none());
    }

    #[test]
    fn test_modal_resolution() {
        let mut feedback = Feedback::default();
        let answer = Rc::new(RefCell::new(None));
        let sink = answer.clone();
        feedback.show_modal(
            ModalOptions {
                title: "Delete?".to_string(),
                ..Default::default()
            },
            CallOptions::new().on_success(move |r| *sink.borrow_mut() = Some(r)),
        );
        assert_eq!(feedback.modal().map(|m| m.title.as_str()), Some("Delete?"));
        feedback.resolve_modal(true).unwrap();
        assert_eq!(
            *answer.borrow(),
            Some(ModalResult {
                confirm: true,
                cancel: false
            })
        );
        assert_eq!(feedback.resolve_modal(true), Err(HostError::NoModal));
    }

    #[test]
    fn test_hide_loading_without_indicator_fails() {
        let mut feedback = Feedback::default();
        let failed = Rc::new(RefCell::new(false));
        let sink = failed.clone();
        feedback.hide_loading(CallOptions::new().on_fail(move |_| *sink.borrow_mut() = true));
        assert!(*failed.borrow());

        feedback.show_loading("Loading", CallOptions::new());
        assert!(feedback.is_loading());
    }
}
