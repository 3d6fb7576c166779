//! Unique table: hash-consing storage for diagram nodes.
//!
//! Every node lives at a stable index; structurally equal nodes share one
//! index, which is what makes diagrams canonical. Collisions are resolved by
//! chaining through the `next` links, and the bucket array doubles whenever
//! the load factor exceeds one.

use crate::node::Node;
use crate::utils::Fingerprint;

pub struct UniqueTable {
    nodes: Vec<Node>,
    /// `next[i]` is the index of the following node in the same bucket, `0` ends the chain.
    next: Vec<u32>,
    buckets: Vec<u32>,
    bitmask: u64,
}

impl UniqueTable {
    /// Create a table with `2^bits` buckets. Index `0` is a sentinel, index `1` is the terminal.
    pub fn new(bits: usize) -> Self {
        assert!(bits <= 28, "Bucket bits should be in the range 0..=28");

        let size = 1usize << bits;
        Self {
            nodes: vec![Node::TERMINAL, Node::TERMINAL],
            next: vec![0, 0],
            buckets: vec![0; size],
            bitmask: (size - 1) as u64,
        }
    }

    /// Number of stored nodes, terminal included.
    pub fn len(&self) -> usize {
        self.nodes.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn num_buckets(&self) -> usize {
        self.buckets.len()
    }

    pub fn node(&self, index: usize) -> &Node {
        assert_ne!(index, 0, "Index is 0");
        &self.nodes[index]
    }

    fn bucket_index(&self, node: &Node) -> usize {
        (node.fingerprint() & self.bitmask) as usize
    }

    /// Find the index of a node equal to `node`, if one is stored.
    pub fn lookup(&self, node: &Node) -> Option<usize> {
        let mut index = self.buckets[self.bucket_index(node)] as usize;
        while index != 0 {
            if &self.nodes[index] == node {
                return Some(index);
            }
            index = self.next[index] as usize;
        }
        None
    }

    /// Store a node that is known to be absent and return its index.
    pub fn insert(&mut self, node: Node) -> usize {
        debug_assert!(self.lookup(&node).is_none());

        if self.nodes.len() > self.buckets.len() {
            self.grow();
        }

        let index = self.nodes.len();
        let bucket = self.bucket_index(&node);
        self.nodes.push(node);
        self.next.push(self.buckets[bucket]);
        self.buckets[bucket] = index as u32;
        index
    }

    fn grow(&mut self) {
        let size = self.buckets.len() * 2;
        self.buckets = vec![0; size];
        self.bitmask = (size - 1) as u64;

        for index in 2..self.nodes.len() {
            let bucket = self.bucket_index(&self.nodes[index]);
            self.next[index] = self.buckets[bucket];
            self.buckets[bucket] = index as u32;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::Ref;

    fn node(variable: u32, low: i32, high: i32) -> Node {
        Node {
            variable,
            low: if low < 0 { -Ref::positive(-low as u32) } else { Ref::positive(low as u32) },
            high: Ref::positive(high as u32),
        }
    }

    #[test]
    fn test_terminal_preallocated() {
        let table = UniqueTable::new(2);
        assert_eq!(table.len(), 1);
        assert!(table.node(1).is_terminal());
    }

    #[test]
    fn test_insert_then_lookup() {
        let mut table = UniqueTable::new(2);
        let n = node(3, -1, 1);
        assert_eq!(table.lookup(&n), None);
        let i = table.insert(n);
        assert_eq!(i, 2);
        assert_eq!(table.lookup(&n), Some(2));
        assert_eq!(table.node(i), &n);
    }

    #[test]
    fn test_grow_keeps_all_nodes_reachable() {
        let mut table = UniqueTable::new(1);
        let nodes: Vec<Node> = (1..=50).map(|v| node(v, -1, 1)).collect();
        let indices: Vec<usize> = nodes.iter().map(|&n| table.insert(n)).collect();
        assert!(table.num_buckets() >= 32);
        for (n, i) in nodes.iter().zip(indices) {
            assert_eq!(table.lookup(n), Some(i));
        }
    }
}
