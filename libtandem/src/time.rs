// Copyright 2021 Cargill Incorporated
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

use std::cmp::PartialOrd;
use std::fmt::Debug;
use std::ops::Add;
use std::time::{Duration, Instant};

pub trait Time: Add<Duration, Output = Self> + PartialOrd + Copy + Debug {}

pub trait TimeSource {
    type Time: Time;

    fn now(&self) -> Self::Time;
}

impl Time for Instant {}

/// Reads the monotonic clock; deadlines built from it are unaffected by wall-clock changes.
#[derive(Default, Clone)]
pub struct MonotonicTimeSource {}

impl MonotonicTimeSource {
    pub fn new() -> Self {
        MonotonicTimeSource {}
    }
}

impl TimeSource for MonotonicTimeSource {
    type Time = Instant;

    fn now(&self) -> Self::Time {
        Instant::now()
    }
}
