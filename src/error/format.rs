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

use crate::error::{ErrorContext, LockerError};
use std::error::Error as _;

/// Renders an error with its context and any underlying source chain.
pub fn format_error_chain(error: &LockerError) -> String {
    let mut output = ErrorContext::new(error).to_string();

    let mut source = error.source();
    while let Some(cause) = source {
        output.push_str(&format!("\n\nCaused by: {cause}"));
        source = cause.source();
    }

    output
}
