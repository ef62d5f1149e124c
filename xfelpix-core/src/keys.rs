//! Grouping of positions by key in order of first appearance.
//!
//! Keys only need `PartialEq`, so floating point metadata such as delays or
//! angles can be used directly. `NaN` never equals itself and therefore
//! forms a group of its own at every occurrence.

/// Positions of a sequence grouped by key.
#[derive(Clone, Debug, PartialEq)]
pub struct KeyGroups<K> {
    keys: Vec<K>,
    members: Vec<Vec<usize>>,
}

impl<K: PartialEq + Clone> KeyGroups<K> {
    /// Groups the positions of `keys` by value.
    #[must_use]
    pub fn from_keys(keys: &[K]) -> Self {
        let mut groups = Self {
            keys: Vec::new(),
            members: Vec::new(),
        };
        for (position, key) in keys.iter().enumerate() {
            match groups.keys.iter().position(|k| k == key) {
                Some(group) => groups.members[group].push(position),
                None => {
                    groups.keys.push(key.clone());
                    groups.members.push(vec![position]);
                }
            }
        }
        groups
    }
}

impl<K> KeyGroups<K> {
    /// Distinct keys in order of first appearance.
    #[must_use]
    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    /// Positions belonging to each key, parallel to [`Self::keys`].
    #[must_use]
    pub fn members(&self) -> &[Vec<usize>] {
        &self.members
    }

    /// Number of distinct keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true if there are no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Iterates over `(key, positions)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &[usize])> {
        self.keys
            .iter()
            .zip(self.members.iter().map(Vec::as_slice))
    }

    /// Group index of every input position.
    #[must_use]
    pub fn group_index(&self) -> Vec<usize> {
        let total = self.members.iter().map(Vec::len).sum();
        let mut index = vec![0; total];
        for (group, positions) in self.members.iter().enumerate() {
            for &position in positions {
                index[position] = group;
            }
        }
        index
    }
}

/// Distinct values of `keys` in order of first appearance.
#[must_use]
pub fn unique_ordered<K: PartialEq + Clone>(keys: &[K]) -> Vec<K> {
    let mut unique: Vec<K> = Vec::new();
    for key in keys {
        if !unique.contains(key) {
            unique.push(key.clone());
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_appearance_order() {
        let groups = KeyGroups::from_keys(&["b", "a", "b", "c", "a"]);
        assert_eq!(groups.keys(), &["b", "a", "c"]);
        assert_eq!(groups.members(), &[vec![0, 2], vec![1, 4], vec![3]]);
        assert_eq!(groups.group_index(), vec![0, 1, 0, 2, 1]);
    }

    #[test]
    fn test_float_keys() {
        let groups = KeyGroups::from_keys(&[0.5, 1.5, 0.5]);
        assert_eq!(groups.len(), 2);
        let nan = KeyGroups::from_keys(&[f64::NAN, f64::NAN]);
        assert_eq!(nan.len(), 2);
    }

    #[test]
    fn test_unique_ordered() {
        assert_eq!(unique_ordered(&[3, 1, 3, 2, 1]), vec![3, 1, 2]);
        assert!(unique_ordered::<i32>(&[]).is_empty());
        assert!(KeyGroups::<i32>::from_keys(&[]).is_empty());
    }
}
