// Copyright 2017 The Australian National University
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

/// returns a mask of `size` bits starting at bit `position`
#[inline(always)]
pub fn mask_u32(position: u32, size: u32) -> u32 {
    if size == 0 {
        0
    } else if size >= 32 {
        !0u32 << position
    } else {
        ((1u32 << size) - 1) << position
    }
}
