// Copyright (c) 2023 The TQUIC Authors.
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

//! Error type for queue discipline and congestion control operations.

use strum_macros::EnumIter;

/// Errors reported at setup and configuration time.
///
/// Packet drops and marks are expected operating conditions and are never
/// reported through this type; they are counted in the statistics of the
/// queue discipline instead.
#[derive(Clone, Debug, Default, PartialEq, Eq, EnumIter)]
pub enum Error {
    /// There is no more work to do.
    #[default]
    Done,

    /// The configuration is invalid, e.g. a queue discipline was given child
    /// classes or packet filters, or an option is out of range.
    InvalidConfig(String),

    /// The operation cannot be completed because it was attempted in an
    /// invalid state.
    InvalidState(String),

    /// The operation is not supported by the component.
    InvalidOperation(String),

    /// A one-time setting was changed after the component had already been
    /// initialized.
    AlreadyInitialized,

    /// I/O error.
    IoError(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

impl std::convert::From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(format!("{}", err))
    }
}

impl std::convert::From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::IoError(format!("{}", err))
    }
}

impl Error {
    /// Whether the error was raised by a structural misconfiguration that
    /// must abort initialization.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::InvalidConfig(_) | Error::InvalidState(_) | Error::AlreadyInitialized
        )
    }
}
