// src/selector.rs
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;

use crate::flag::COD_FLAG;
use crate::resolver::{FlagResolver, ResolverState};
use crate::source::FlagSource;

pub const LOADING_TEXT: &str = "Loading payment options...";
pub const LEGEND: &str = "Payment Method";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    CreditCard,
    Netbanking,
    Cod,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 3] = [
        PaymentMethod::CreditCard,
        PaymentMethod::Netbanking,
        PaymentMethod::Cod,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::CreditCard => "credit_card",
            PaymentMethod::Netbanking => "netbanking",
            PaymentMethod::Cod => "cod",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PaymentMethod::CreditCard => "Credit Card",
            PaymentMethod::Netbanking => "Net Banking",
            PaymentMethod::Cod => "Cash on Delivery",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown payment method: {0:?}")]
pub struct ParsePaymentMethodError(pub String);

impl FromStr for PaymentMethod {
    type Err = ParsePaymentMethodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaymentMethod::ALL
            .into_iter()
            .find(|method| method.as_str() == s)
            .ok_or_else(|| ParsePaymentMethodError(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("payment options are still loading")]
    Loading,

    #[error("payment method {0} is not offered")]
    NotRendered(PaymentMethod),

    #[error("no payment option labelled {0:?}")]
    UnknownLabel(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentOption {
    pub method: PaymentMethod,
    pub label: &'static str,
    pub checked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentForm {
    pub legend: &'static str,
    pub options: Vec<PaymentOption>,
}

impl PaymentForm {
    pub fn option(&self, method: PaymentMethod) -> Option<&PaymentOption> {
        self.options.iter().find(|o| o.method == method)
    }

    pub fn by_label(&self, label: &str) -> Option<&PaymentOption> {
        self.options.iter().find(|o| o.label == label)
    }

    pub fn labels(&self) -> Vec<&'static str> {
        self.options.iter().map(|o| o.label).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentView {
    Loading(&'static str),
    Options(PaymentForm),
}

impl PaymentView {
    pub fn is_loading(&self) -> bool {
        matches!(self, PaymentView::Loading(_))
    }

    pub fn options(&self) -> &[PaymentOption] {
        match self {
            PaymentView::Loading(_) => &[],
            PaymentView::Options(form) => &form.options,
        }
    }

    pub fn labels(&self) -> Vec<&'static str> {
        self.options().iter().map(|o| o.label).collect()
    }
}

pub fn render(selected: PaymentMethod, cod: &ResolverState) -> PaymentView {
    if cod.loading {
        return PaymentView::Loading(LOADING_TEXT);
    }

    let options = PaymentMethod::ALL
        .into_iter()
        .filter(|method| *method != PaymentMethod::Cod || cod.enabled)
        .map(|method| PaymentOption {
            method,
            label: method.label(),
            checked: method == selected,
        })
        .collect();

    PaymentView::Options(PaymentForm {
        legend: LEGEND,
        options,
    })
}

/// Selecting an option only reports it through `on_change`; the caller
/// feeds the new value back with [`PaymentOptions::set_selected`].
pub struct PaymentOptions<S: ?Sized> {
    resolver: FlagResolver<S>,
    updates: watch::Receiver<ResolverState>,
    selected: PaymentMethod,
    on_change: Box<dyn FnMut(PaymentMethod) + Send>,
}

impl<S> PaymentOptions<S>
where
    S: FlagSource + ?Sized + 'static,
{
    pub fn mount<F>(source: Arc<S>, selected: PaymentMethod, on_change: F) -> Self
    where
        F: FnMut(PaymentMethod) + Send + 'static,
    {
        let resolver = FlagResolver::new(source, COD_FLAG);
        let updates = resolver.subscribe();
        Self {
            resolver,
            updates,
            selected,
            on_change: Box::new(on_change),
        }
    }

    pub fn render(&self) -> PaymentView {
        render(self.selected, &self.resolver.state())
    }

    /// Waits for the next resolver change and renders it.
    pub async fn changed(&mut self) -> PaymentView {
        let state = match self.updates.changed().await {
            Ok(()) => self.updates.borrow_and_update().clone(),
            Err(_) => self.resolver.state(),
        };
        render(self.selected, &state)
    }

    pub async fn settled(&self) -> PaymentView {
        let state = self.resolver.settled().await;
        render(self.selected, &state)
    }

    pub fn select(&mut self, method: PaymentMethod) -> Result<(), SelectionError> {
        match self.render() {
            PaymentView::Loading(_) => Err(SelectionError::Loading),
            PaymentView::Options(form) => {
                if form.option(method).is_none() {
                    return Err(SelectionError::NotRendered(method));
                }
                (self.on_change)(method);
                Ok(())
            }
        }
    }

    pub fn select_label(&mut self, label: &str) -> Result<(), SelectionError> {
        let method = match self.render() {
            PaymentView::Loading(_) => return Err(SelectionError::Loading),
            PaymentView::Options(form) => form
                .by_label(label)
                .map(|o| o.method)
                .ok_or_else(|| SelectionError::UnknownLabel(label.to_string()))?,
        };
        (self.on_change)(method);
        Ok(())
    }

    pub fn selected(&self) -> PaymentMethod {
        self.selected
    }

    pub fn set_selected(&mut self, method: PaymentMethod) {
        self.selected = method;
    }

    pub fn resolver(&self) -> &FlagResolver<S> {
        &self.resolver
    }
}
