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

use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;
use std::iter::FromIterator;

use linked_hash_map::Keys;
use linked_hash_map::LinkedHashMap;

/// A set that remembers insertion order. Iteration and `pop_front` follow that order,
/// which keeps worklists deterministic.
pub struct LinkedHashSet<K: Hash + Eq>(LinkedHashMap<K, ()>);

impl<K: Hash + Eq> LinkedHashSet<K> {
    pub fn new() -> Self {
        LinkedHashSet(LinkedHashMap::new())
    }

    /// returns true if the value was not present before
    pub fn insert(&mut self, k: K) -> bool {
        self.0.insert(k, ()).is_none()
    }

    pub fn contains<Q: ?Sized>(&self, k: &Q) -> bool
        where K: Borrow<Q>,
              Q: Eq + Hash
    {
        self.0.contains_key(k)
    }

    pub fn remove<Q: ?Sized>(&mut self, k: &Q) -> bool
        where K: Borrow<Q>,
              Q: Eq + Hash
    {
        self.0.remove(k).is_some()
    }

    pub fn iter(&self) -> Keys<K, ()> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn pop_front(&mut self) -> Option<K> {
        self.0.pop_front().map(|(k, _)| k)
    }

    pub fn clear(&mut self) {
        self.0.clear()
    }
}

impl<K: Hash + Eq> Default for LinkedHashSet<K> {
    fn default() -> Self {
        LinkedHashSet::new()
    }
}

impl<K: Hash + Eq + Clone> Clone for LinkedHashSet<K> {
    fn clone(&self) -> Self {
        LinkedHashSet(self.0.clone())
    }
}

impl<K: Hash + Eq> FromIterator<K> for LinkedHashSet<K> {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        let mut ret = LinkedHashSet::new();
        for k in iter {
            ret.insert(k);
        }
        ret
    }
}

impl<K: fmt::Debug + Hash + Eq> fmt::Debug for LinkedHashSet<K> {
    /// Returns a string that lists the elements in insertion order.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
