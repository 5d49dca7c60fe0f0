// Tanklog - Log water quality sensor readings to Google Sheets
//
// Copyright 2025 The tanklog authors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

#![cfg(test)]

use crate::sensor::core::{SensorError, SensorErrorKind, Transport};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Transport implementation that answers requests in order from a queue of
/// canned bodies. Used to drive a token grant followed by a business call.
pub(crate) struct SequenceTransport {
    bodies: Mutex<VecDeque<String>>,
}

impl SequenceTransport {
    pub(crate) fn new<I>(bodies: I) -> Self
    where
        I: IntoIterator<Item = &'static str>,
    {
        SequenceTransport {
            bodies: Mutex::new(bodies.into_iter().map(String::from).collect()),
        }
    }
}

impl Transport for SequenceTransport {
    async fn get(&self, _path_and_query: &str, _headers: &[(&'static str, String)]) -> Result<String, SensorError> {
        let mut bodies = self.bodies.lock().unwrap();
        bodies
            .pop_front()
            .ok_or(SensorError::KindMsg(SensorErrorKind::Transport, "no canned responses left"))
    }
}

/// Transport implementation that fails every request at the connection level.
pub(crate) struct UnreachableTransport;

impl Transport for UnreachableTransport {
    async fn get(&self, _path_and_query: &str, _headers: &[(&'static str, String)]) -> Result<String, SensorError> {
        Err(SensorError::KindMsg(SensorErrorKind::Transport, "transport is unreachable"))
    }
}
