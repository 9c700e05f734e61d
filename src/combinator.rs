//! Futures built from other futures.
//!
//! Everything here goes through [`Future::new`] and [`Future::then`] only.
use std::sync::{Arc, Mutex, PoisonError};

use crate::future::{Future, Status};
use crate::resolution::Resolution;
use crate::{FutureReason, FutureValue};

/// How one input of [`Future::all_settled`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement<T, E> {
    Fulfilled { value: T },
    Rejected { reason: E },
}

impl<T, E> Settlement<T, E> {
    pub fn status(&self) -> Status {
        match self {
            Settlement::Fulfilled { .. } => Status::Fulfilled,
            Settlement::Rejected { .. } => Status::Rejected,
        }
    }
}

/// Index-aligned results still being collected.
struct Slots<V> {
    values: Vec<Option<V>>,
    remaining: usize,
}

impl<V> Slots<V> {
    fn shared(len: usize) -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(Slots {
            values: std::iter::repeat_with(|| None).take(len).collect(),
            remaining: len,
        }))
    }

    /// Stores `value`; returns every value once the last slot is filled.
    fn fill(slots: &Mutex<Self>, index: usize, value: V) -> Option<Vec<V>> {
        let mut slots = slots.lock().unwrap_or_else(PoisonError::into_inner);
        if slots.values[index].replace(value).is_none() {
            slots.remaining -= 1;
        }
        if slots.remaining > 0 {
            return None;
        }
        Some(slots.values.iter_mut().filter_map(Option::take).collect())
    }
}

impl<T: FutureValue, E: FutureReason> Future<T, E> {
    /// An already fulfilled future.
    pub fn resolve(value: T) -> Self {
        Self::new(move |resolve, _| {
            resolve.resolve(value);
            Ok(())
        })
    }

    /// An already rejected future.
    pub fn reject(reason: E) -> Self {
        Self::new(move |_, reject| {
            reject.reject(reason);
            Ok(())
        })
    }

    /// The future a resolution stands for. Futures come back as they are.
    pub fn from_resolution(resolution: Resolution<T, E>) -> Self {
        match resolution {
            Resolution::Future(future) => future,
            other => Self::new(move |resolve, _| {
                resolve.resolve_with(other);
                Ok(())
            }),
        }
    }

    /// Fulfills with every input's value, in input order, or rejects with the
    /// first rejection observed.
    ///
    /// Inputs still pending when another one rejects are left alone.
    pub fn all<I>(items: I) -> Future<Vec<T>, E>
    where
        I: IntoIterator,
        I::Item: Into<Resolution<T, E>>,
    {
        let items: Vec<Resolution<T, E>> = items.into_iter().map(Into::into).collect();
        Future::new(move |resolve, reject| {
            if items.is_empty() {
                resolve.resolve(Vec::new());
                return Ok(());
            }
            let slots = Slots::shared(items.len());
            for (index, item) in items.into_iter().enumerate() {
                let (slots, resolve, reject) = (slots.clone(), resolve.clone(), reject.clone());
                Self::from_resolution(item).then(
                    move |value| {
                        if let Some(values) = Slots::fill(&slots, index, value) {
                            resolve.resolve(values);
                        }
                        Ok(Resolution::Value(()))
                    },
                    move |reason| {
                        reject.reject(reason);
                        Ok(Resolution::Value(()))
                    },
                );
            }
            Ok(())
        })
    }

    /// Fulfills once every input settled, recording how each one ended.
    /// Never rejects because an input did.
    pub fn all_settled<I>(items: I) -> Future<Vec<Settlement<T, E>>, E>
    where
        I: IntoIterator,
        I::Item: Into<Resolution<T, E>>,
    {
        let items: Vec<Resolution<T, E>> = items.into_iter().map(Into::into).collect();
        Future::new(move |resolve, _| {
            if items.is_empty() {
                resolve.resolve(Vec::new());
                return Ok(());
            }
            let slots = Slots::shared(items.len());
            for (index, item) in items.into_iter().enumerate() {
                let (on_value, on_reason) = (slots.clone(), slots.clone());
                let (resolve_value, resolve_reason) = (resolve.clone(), resolve.clone());
                Self::from_resolution(item).then(
                    move |value| {
                        let settled = Settlement::Fulfilled { value };
                        if let Some(values) = Slots::fill(&on_value, index, settled) {
                            resolve_value.resolve(values);
                        }
                        Ok(Resolution::Value(()))
                    },
                    move |reason| {
                        let settled = Settlement::Rejected { reason };
                        if let Some(values) = Slots::fill(&on_reason, index, settled) {
                            resolve_reason.resolve(values);
                        }
                        Ok(Resolution::Value(()))
                    },
                );
            }
            Ok(())
        })
    }

    /// Settles like whichever input settles first.
    ///
    /// Plain values settle the race while the inputs are being walked, so they
    /// beat any future. An empty input never settles.
    pub fn race<I>(items: I) -> Future<T, E>
    where
        I: IntoIterator,
        I::Item: Into<Resolution<T, E>>,
    {
        Future::new(move |resolve, reject| {
            for item in items {
                let item: Resolution<T, E> = item.into();
                match item {
                    Resolution::Value(value) => resolve.resolve(value),
                    other => {
                        let (resolve, reject) = (resolve.clone(), reject.clone());
                        Self::from_resolution(other).then(
                            move |value| {
                                resolve.resolve(value);
                                Ok(Resolution::Value(()))
                            },
                            move |reason| {
                                reject.reject(reason);
                                Ok(Resolution::Value(()))
                            },
                        );
                    }
                }
            }
            Ok(())
        })
    }
}
