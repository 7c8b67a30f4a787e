//! Form modal controller
//!
//! Holds what a create/edit dialog needs between renders: open flag, current
//! values, per-field errors and the last user-facing notice. `submit` runs a
//! mutation and applies the outcome:
//! - success: close, reset values, clear errors, success notice
//! - validation error (422): stay open, keep values, record field messages
//! - anything else: stay open, destructive notice

use crate::client::{ApiError, Envelope, ErrorKind, FieldErrors};
use crate::models::AddressForm;
use crate::mutation::Mutation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeVariant {
    Success,
    Destructive,
}

/// Transient toast-style message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub description: String,
    pub variant: NoticeVariant,
}

impl Notice {
    pub fn success(description: impl Into<String>) -> Self {
        Self {
            title: "Success".to_string(),
            description: description.into(),
            variant: NoticeVariant::Success,
        }
    }

    pub fn error(description: impl Into<String>) -> Self {
        Self {
            title: "Error".to_string(),
            description: description.into(),
            variant: NoticeVariant::Destructive,
        }
    }
}

/// Local checks run before any request is sent.
pub type Validator<F> = fn(&F) -> FieldErrors;

pub struct FormModal<F> {
    open: bool,
    values: F,
    errors: FieldErrors,
    notice: Option<Notice>,
    submitting: bool,
    success_message: String,
    failure_message: String,
    validator: Option<Validator<F>>,
}

impl<F: std::fmt::Debug> std::fmt::Debug for FormModal<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormModal")
            .field("open", &self.open)
            .field("values", &self.values)
            .field("errors", &self.errors)
            .field("notice", &self.notice)
            .finish()
    }
}

impl<F: Default> FormModal<F> {
    /// `success_message` / `failure_message` are shown when the server
    /// provides no message of its own.
    pub fn new(success_message: impl Into<String>, failure_message: impl Into<String>) -> Self {
        Self {
            open: false,
            values: F::default(),
            errors: FieldErrors::new(),
            notice: None,
            submitting: false,
            success_message: success_message.into(),
            failure_message: failure_message.into(),
            validator: None,
        }
    }

    pub fn with_validator(mut self, validator: Validator<F>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn open(&mut self) {
        self.open = true;
    }

    /// Open pre-filled, for edit dialogs.
    pub fn open_with(&mut self, values: F) {
        self.values = values;
        self.errors.clear();
        self.open = true;
    }

    /// Dismiss without submitting. Values are kept for the next open.
    pub fn close(&mut self) {
        self.open = false;
        self.errors.clear();
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    pub fn values(&self) -> &F {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut F {
        &mut self.values
    }

    pub fn errors(&self) -> &FieldErrors {
        &self.errors
    }

    pub fn field_error(&self, field: &str) -> Option<&[String]> {
        self.errors.get(field).map(Vec::as_slice)
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn take_notice(&mut self) -> Option<Notice> {
        self.notice.take()
    }

    fn reset(&mut self) {
        self.open = false;
        self.values = F::default();
        self.errors.clear();
    }
}

impl<F: Clone + Default> FormModal<F> {
    /// Submit when the mutation takes the form values as-is.
    pub async fn submit<T>(&mut self, mutation: &Mutation<F, Envelope<T>>) -> Result<Envelope<T>, ApiError>
    where
        F: Send + 'static,
        T: Send + 'static,
    {
        self.submit_with(mutation, |values| values).await
    }

    /// Submit with the values mapped into the mutation's arguments
    /// (e.g. `(id, values)` for an update).
    pub async fn submit_with<A, T>(
        &mut self,
        mutation: &Mutation<A, Envelope<T>>,
        args: impl FnOnce(F) -> A,
    ) -> Result<Envelope<T>, ApiError>
    where
        A: Send + 'static,
        T: Send + 'static,
    {
        if let Some(validate) = self.validator {
            let errors = validate(&self.values);
            if !errors.is_empty() {
                tracing::debug!(mutation = mutation.name(), fields = errors.len(), "Form failed local validation");
                self.errors = errors.clone();
                return Err(ApiError::Validation {
                    message: "Validation failed".to_string(),
                    errors,
                });
            }
        }

        self.submitting = true;
        let result = mutation.mutate(args(self.values.clone())).await;
        self.submitting = false;

        match &result {
            Ok(envelope) => {
                let message = envelope
                    .message
                    .clone()
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| self.success_message.clone());
                self.reset();
                self.notice = Some(Notice::success(message));
            }
            Err(e) if e.kind() == ErrorKind::Validation => {
                self.errors = e.field_errors().cloned().unwrap_or_default();
                self.notice = Some(Notice::error(e.user_message(&self.failure_message)));
            }
            Err(e) => {
                self.errors.clear();
                self.notice = Some(Notice::error(e.user_message(&self.failure_message)));
            }
        }
        result
    }
}

/// Required-field checks for the address dialog.
pub fn validate_address(form: &AddressForm) -> FieldErrors {
    let required = [
        ("name", &form.name, "Address name is required"),
        ("street", &form.street, "Street address is required"),
        ("city", &form.city, "City is required"),
        ("state", &form.state, "State is required"),
        ("country", &form.country, "Country is required"),
        ("postal_code", &form.postal_code, "Postal code is required"),
        ("phone", &form.phone, "Phone number is required"),
    ];

    required
        .iter()
        .filter(|(_, value, _)| value.trim().is_empty())
        .map(|(field, _, message)| (field.to_string(), vec![message.to_string()]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueryConfig;
    use crate::query::QueryClient;
    use std::collections::BTreeMap;

    fn filled_address() -> AddressForm {
        AddressForm {
            name: "Home".to_string(),
            street: "12 Palm St".to_string(),
            city: "Erbil".to_string(),
            state: "Kurdistan".to_string(),
            postal_code: "44001".to_string(),
            phone: "+964 750 000 0000".to_string(),
            ..Default::default()
        }
    }

    fn envelope(message: Option<&str>) -> Envelope<()> {
        Envelope {
            success: true,
            data: (),
            message: message.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_success_closes_and_resets() {
        let mutation: Mutation<AddressForm, Envelope<()>> =
            Mutation::new("create_address", QueryClient::new(QueryConfig::default()), |_| async {
                Ok(envelope(None))
            });

        let mut modal = FormModal::<AddressForm>::new("Address created successfully", "Failed to create address");
        modal.open_with(filled_address());
        modal.submit(&mutation).await.unwrap();

        assert!(!modal.is_open());
        assert_eq!(modal.values(), &AddressForm::default());
        assert!(modal.errors().is_empty());
        let notice = modal.take_notice().unwrap();
        assert_eq!(notice.variant, NoticeVariant::Success);
        assert_eq!(notice.description, "Address created successfully");
    }

    #[tokio::test]
    async fn test_validation_error_keeps_modal_open() {
        let mutation: Mutation<AddressForm, Envelope<()>> =
            Mutation::new("create_address", QueryClient::new(QueryConfig::default()), |_| async {
                let mut errors = BTreeMap::new();
                errors.insert("city".to_string(), vec!["The city field is required.".to_string()]);
                Err(ApiError::Validation {
                    message: "The given data was invalid.".to_string(),
                    errors,
                })
            });

        let mut modal = FormModal::<AddressForm>::new("ok", "Failed to create address");
        modal.open_with(filled_address());
        let err = modal.submit(&mutation).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(modal.is_open());
        assert_eq!(modal.values(), &filled_address());
        assert_eq!(
            modal.field_error("city"),
            Some(&["The city field is required.".to_string()][..])
        );
    }

    #[tokio::test]
    async fn test_generic_error_uses_fallback_notice() {
        let mutation: Mutation<AddressForm, Envelope<()>> =
            Mutation::new("create_address", QueryClient::new(QueryConfig::default()), |_| async {
                Err(ApiError::Api {
                    status: 500,
                    message: String::new(),
                })
            });

        let mut modal = FormModal::<AddressForm>::new("ok", "Failed to create address");
        modal.open_with(filled_address());
        assert!(modal.submit(&mutation).await.is_err());

        assert!(modal.is_open());
        let notice = modal.notice().unwrap();
        assert_eq!(notice.variant, NoticeVariant::Destructive);
        assert_eq!(notice.description, "Failed to create address");
    }

    #[tokio::test]
    async fn test_local_validation_sends_nothing() {
        let calls = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = calls.clone();
        let mutation: Mutation<AddressForm, Envelope<()>> =
            Mutation::new("create_address", QueryClient::new(QueryConfig::default()), move |_| {
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                async { Ok(envelope(None)) }
            });

        let mut modal = FormModal::<AddressForm>::new("ok", "failed").with_validator(validate_address);
        modal.open();
        assert!(modal.submit(&mutation).await.is_err());

        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert!(modal.field_error("street").is_some());
        assert!(modal.field_error("country").is_none(), "country defaults to Iraq");
    }

    #[test]
    fn test_validate_address_accepts_complete_form() {
        assert!(validate_address(&filled_address()).is_empty());
    }
}
