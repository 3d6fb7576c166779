use std::collections::HashMap;

use num_bigint::BigUint;

use crate::bdd::Bdd;
use crate::reference::Ref;

impl Bdd {
    /// Returns the literals along one path from `node` to the one terminal,
    /// or `None` for the constant false function.
    ///
    /// The walk prefers the low (false) branch, so the path describes the
    /// numerically smallest satisfying packet once every variable it does
    /// not mention is set to false.
    pub fn one_sat(&self, node: Ref) -> Option<Vec<(u32, bool)>> {
        if self.is_zero(node) {
            return None;
        }

        let mut path = Vec::new();
        let mut current = node;
        while !self.is_one(current) {
            let v = self.variable(current);
            let low = self.low_node(current);
            if !self.is_zero(low) {
                path.push((v, false));
                current = low;
            } else {
                path.push((v, true));
                current = self.high_node(current);
            }
        }
        Some(path)
    }

    /// Number of assignments to `num_vars` variables that satisfy `node`.
    pub fn sat_count(&self, node: Ref, num_vars: usize) -> BigUint {
        let max = BigUint::from(1u32) << num_vars;
        let mut cache = HashMap::new();
        self.sat_count_rec(node, &max, &mut cache)
    }

    fn sat_count_rec(&self, node: Ref, max: &BigUint, cache: &mut HashMap<Ref, BigUint>) -> BigUint {
        if self.is_zero(node) {
            return BigUint::ZERO;
        } else if self.is_one(node) {
            return max.clone();
        }

        if node.is_negated() {
            return max - self.sat_count_rec(-node, max, cache);
        }
        if let Some(count) = cache.get(&node) {
            return count.clone();
        }

        let count_low = self.sat_count_rec(self.low_node(node), max, cache);
        let count_high = self.sat_count_rec(self.high_node(node), max, cache);
        let count: BigUint = (count_low + count_high) >> 1;

        cache.insert(node, count.clone());
        count
    }
}
