// Copyright 2025 dentsusoken
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::error::{LockerError, Result};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use uuid::Uuid;

/// Identifier of a lockable entity.
///
/// Keys are compared by value. `validate` rejects keys that cannot name an
/// entity; a missing key (`None`) or an empty string is the Rust rendition of
/// a null identifier.
pub trait EntityKey: Eq + Hash + Clone + Debug + Send + Sync + 'static {
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Label used in log records and error messages.
    fn label(&self) -> String {
        format!("{self:?}")
    }
}

fn require_text(value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(LockerError::InvalidKey {
            details: "entity key must not be empty or blank".to_string(),
        });
    }
    Ok(())
}

impl EntityKey for String {
    fn validate(&self) -> Result<()> {
        require_text(self)
    }
}

impl EntityKey for &'static str {
    fn validate(&self) -> Result<()> {
        require_text(self)
    }
}

impl EntityKey for Box<str> {
    fn validate(&self) -> Result<()> {
        require_text(self)
    }
}

impl EntityKey for Arc<str> {
    fn validate(&self) -> Result<()> {
        require_text(self)
    }
}

impl EntityKey for Uuid {
    fn validate(&self) -> Result<()> {
        if self.is_nil() {
            return Err(LockerError::InvalidKey {
                details: "entity key must not be the nil UUID".to_string(),
            });
        }
        Ok(())
    }

    fn label(&self) -> String {
        self.hyphenated().to_string()
    }
}

impl<K: EntityKey> EntityKey for Option<K> {
    fn validate(&self) -> Result<()> {
        match self {
            Some(key) => key.validate(),
            None => Err(LockerError::InvalidKey {
                details: "entity key is missing".to_string(),
            }),
        }
    }

    fn label(&self) -> String {
        match self {
            Some(key) => key.label(),
            None => "<none>".to_string(),
        }
    }
}

impl<A: EntityKey, B: EntityKey> EntityKey for (A, B) {
    fn validate(&self) -> Result<()> {
        self.0.validate()?;
        self.1.validate()
    }

    fn label(&self) -> String {
        format!("{}/{}", self.0.label(), self.1.label())
    }
}

macro_rules! integer_keys {
    ($($ty:ty),* $(,)?) => {
        $(
            impl EntityKey for $ty {
                fn label(&self) -> String {
                    self.to_string()
                }
            }
        )*
    };
}

integer_keys!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize);
