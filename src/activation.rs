//! Activation functions keyed by name.
//!
//! Node genes refer to their activation by a string key so that the set of
//! available functions can be configured (`activation_options`) and extended
//! without touching the gene model. [`Activations`] resolves keys to plain
//! function pointers when a phenotype is built.

use std::collections::BTreeMap;

use crate::error::{NeatError, Result};

/// Signature shared by every activation function.
pub type ActivationFn = fn(f32) -> f32;

const SELU_ALPHA: f32 = 1.673_263_2;
const SELU_SCALE: f32 = 1.050_701;
const ISRU_ALPHA: f32 = 3.0;

/// f(x) = x
#[inline]
pub fn identity(x: f32) -> f32 {
    x
}

/// f(x) = 1 / (1 + e^(-x))
#[inline]
pub fn sigmoid(x: f32) -> f32 {
    if x.is_nan() {
        return f32::NAN;
    }
    // sigmoid(±88) already saturates f32
    let clamped = x.clamp(-88.0, 88.0);
    1.0 / (1.0 + (-clamped).exp())
}

#[inline]
pub fn tanh(x: f32) -> f32 {
    x.tanh()
}

#[inline]
pub fn sin(x: f32) -> f32 {
    x.sin()
}

/// f(x) = e^(-x^2)
#[inline]
pub fn gauss(x: f32) -> f32 {
    (-x * x).exp()
}

#[inline]
pub fn relu(x: f32) -> f32 {
    if x > 0.0 {
        x
    } else {
        0.0
    }
}

/// f(x) = ln(1 + e^x)
#[inline]
pub fn softplus(x: f32) -> f32 {
    // ln(1 + e^x) ≈ x once e^x dominates
    if x > 20.0 {
        x
    } else {
        x.exp().ln_1p()
    }
}

/// Clamp into [-1, 1].
#[inline]
pub fn clamped(x: f32) -> f32 {
    x.clamp(-1.0, 1.0)
}

/// f(x) = 1 / x, with f(0) = 0.
#[inline]
pub fn inv(x: f32) -> f32 {
    if x == 0.0 {
        0.0
    } else {
        1.0 / x
    }
}

/// Natural logarithm of `max(x, 1e-7)`.
#[inline]
pub fn log(x: f32) -> f32 {
    x.max(1e-7).ln()
}

#[inline]
pub fn exp(x: f32) -> f32 {
    x.exp()
}

#[inline]
pub fn abs(x: f32) -> f32 {
    x.abs()
}

/// f(x) = max(0, 1 - |x|)
#[inline]
pub fn hat(x: f32) -> f32 {
    (1.0 - x.abs()).max(0.0)
}

#[inline]
pub fn square(x: f32) -> f32 {
    x * x
}

#[inline]
pub fn cube(x: f32) -> f32 {
    x * x * x
}

/// 1 if x > 0 else 0.
#[inline]
pub fn step(x: f32) -> f32 {
    if x > 0.0 {
        1.0
    } else {
        0.0
    }
}

#[inline]
pub fn arctan(x: f32) -> f32 {
    x.atan()
}

/// f(x) = x / (1 + |x|)
#[inline]
pub fn softsign(x: f32) -> f32 {
    x / (1.0 + x.abs())
}

/// Inverse square root unit: x / sqrt(1 + αx²).
#[inline]
pub fn isrua(x: f32) -> f32 {
    x / (1.0 + ISRU_ALPHA * x * x).sqrt()
}

/// Leaky ReLU with slope 0.01 below zero.
#[inline]
pub fn lrelu(x: f32) -> f32 {
    if x > 0.0 {
        x
    } else {
        0.01 * x
    }
}

#[inline]
pub fn elu(x: f32) -> f32 {
    if x > 0.0 {
        x
    } else {
        x.exp_m1()
    }
}

/// Scaled ELU.
#[inline]
pub fn selu(x: f32) -> f32 {
    if x > 0.0 {
        SELU_SCALE * x
    } else {
        SELU_SCALE * SELU_ALPHA * x.exp_m1()
    }
}

/// Inverse square root linear unit: identity above zero, ISRU below.
#[inline]
pub fn isrlua(x: f32) -> f32 {
    if x > 0.0 {
        x
    } else {
        isrua(x)
    }
}

/// Bent identity: (sqrt(x² + 1) - 1) / 2 + x
#[inline]
pub fn bent(x: f32) -> f32 {
    ((x * x + 1.0).sqrt() - 1.0) / 2.0 + x
}

/// sin(x) / x, with f(0) = 1.
#[inline]
pub fn sinc(x: f32) -> f32 {
    if x == 0.0 {
        1.0
    } else {
        x.sin() / x
    }
}

/// Registry of activation functions by key.
#[derive(Debug, Clone)]
pub struct Activations {
    functions: BTreeMap<String, ActivationFn>,
}

impl Default for Activations {
    fn default() -> Self {
        let builtin: [(&str, ActivationFn); 25] = [
            ("sigmoid", sigmoid),
            ("tanh", tanh),
            ("sin", sin),
            ("gauss", gauss),
            ("relu", relu),
            ("softplus", softplus),
            ("identity", identity),
            ("clamped", clamped),
            ("inv", inv),
            ("log", log),
            ("exp", exp),
            ("abs", abs),
            ("hat", hat),
            ("square", square),
            ("cube", cube),
            ("step", step),
            ("arctan", arctan),
            ("softsign", softsign),
            ("isrua", isrua),
            ("lrelu", lrelu),
            ("elu", elu),
            ("selu", selu),
            ("isrlua", isrlua),
            ("bent", bent),
            ("sinc", sinc),
        ];
        Self {
            functions: builtin
                .into_iter()
                .map(|(name, f)| (name.to_string(), f))
                .collect(),
        }
    }
}

impl Activations {
    /// Look up the function registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`NeatError::UnknownActivation`] if the key is not registered.
    pub fn get(&self, name: &str) -> Result<ActivationFn> {
        self.functions
            .get(name)
            .copied()
            .ok_or_else(|| NeatError::UnknownActivation(name.to_string()))
    }

    /// Register (or replace) a function under `name`.
    pub fn register(&mut self, name: impl Into<String>, function: ActivationFn) {
        self.functions.insert(name.into(), function);
    }

    #[must_use]
    pub fn is_valid(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Registered keys in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }
}
