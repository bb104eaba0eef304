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

/// rounds `x` up to the next multiple of `align` (which must be a power of two)
#[inline(always)]
pub fn align_up(x: u32, align: u32) -> u32 {
    debug_assert!(is_power_of_two(align), "alignment {} is not a power of two", align);
    (x + align - 1) & !(align - 1)
}

#[inline(always)]
pub fn is_power_of_two(x: u32) -> bool {
    x != 0 && x & (x - 1) == 0
}
