use super::*;

use proptest::prelude::*;
use std::collections::BTreeMap;

fn enc(key: &[u8]) -> Vec<u8> {
    let mut out = (key.len() as u16).to_be_bytes().to_vec();
    out.extend_from_slice(key);
    out
}

/// Walk the whole tree and check the structural invariants.
fn validate_tree<V>(t: &Critnib<Vec<u8>, V>) {
    // (node, split point of its parent, (byte, bit, slot) taken on the way down)
    let mut stack: Vec<(Ref, Option<(usize, u8)>, Vec<(usize, u8, usize)>)> = Vec::new();
    if let Some(root) = t.root {
        stack.push((root, None, Vec::new()));
    }

    let mut leaf_count = 0usize;
    let mut branch_count = 0usize;
    while let Some((r, parent, path)) = stack.pop() {
        match r {
            Ref::Leaf(id) => {
                leaf_count += 1;
                let key = &t.leaves.get(id).key;
                for &(byte, bit, idx) in &path {
                    assert!(byte < key.len(), "leaf key shorter than an ancestor split");
                    assert_eq!(
                        slice_index(key[byte], bit),
                        idx,
                        "leaf reachable through the wrong slot"
                    );
                }
            }
            Ref::Branch(b) => {
                branch_count += 1;
                let branch = t.branches.get(b);
                assert!(branch.bit % SLICE == 0 && branch.bit < 8, "bad shift");

                if let Some((pbyte, pbit)) = parent {
                    assert!(
                        branch.byte > pbyte || (branch.byte == pbyte && branch.bit < pbit),
                        "child branch must split after its parent"
                    );
                }

                let children = branch.child.iter().flatten().count();
                assert!(children >= 2, "branch with {children} children");

                for (idx, child) in branch.child.iter().enumerate() {
                    if let Some(child) = child {
                        let mut path = path.clone();
                        path.push((branch.byte, branch.bit, idx));
                        stack.push((*child, Some((branch.byte, branch.bit)), path));
                    }
                }
            }
        }
    }

    assert_eq!(leaf_count, t.len(), "reachable leaf count must match len");
    assert_eq!(branch_count, t.branches.live(), "unreachable branch in arena");
    // Every branch has at least two children.
    assert!(
        branch_count < leaf_count || leaf_count == 0 && branch_count == 0,
        "{branch_count} branches for {leaf_count} leaves"
    );
}

#[derive(Clone, Debug)]
enum Op {
    Set(Vec<u8>, u64),
    Remove(Vec<u8>),
    Get(Vec<u8>),
}

fn key_strategy() -> impl Strategy<Value = Vec<u8>> + Clone {
    // Small alphabet so that keys collide and share long prefixes often.
    prop_oneof![
        prop::collection::vec(0u8..4, 0..=12),
        prop::collection::vec(any::<u8>(), 0..=32),
    ]
    .prop_map(|k| enc(&k))
}

fn ops_strategy() -> impl Strategy<Value = Vec<Op>> {
    let key = key_strategy();
    let op = prop_oneof![
        50 => (key.clone(), any::<u64>()).prop_map(|(k, v)| Op::Set(k, v)),
        25 => key.clone().prop_map(Op::Remove),
        25 => key.clone().prop_map(Op::Get),
    ];
    prop::collection::vec(op, 0..=2000)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        max_shrink_iters: 50_000,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_equivalence(ops in ops_strategy()) {
        let mut t: Critnib<Vec<u8>, u64> = Critnib::new();
        let mut m: BTreeMap<Vec<u8>, u64> = BTreeMap::new();

        for op in ops {
            match op {
                Op::Set(key, value) => {
                    let got = t.set(key.clone(), value);
                    if m.contains_key(&key) {
                        prop_assert_eq!(got, Err(IndexError::AlreadyExists));
                    } else {
                        prop_assert_eq!(got, Ok(()));
                        m.insert(key, value);
                    }
                }
                Op::Remove(key) => {
                    prop_assert_eq!(t.remove(&key), m.remove(&key));
                }
                Op::Get(key) => {
                    prop_assert_eq!(t.get(&key).copied(), m.get(&key).copied());
                }
            }

            prop_assert_eq!(t.len(), m.len());
        }

        validate_tree(&t);
        let got: Vec<(Vec<u8>, u64)> = t.iter().map(|(k, v)| (k.clone(), *v)).collect();
        let expected: Vec<(Vec<u8>, u64)> = m.into_iter().collect();
        prop_assert_eq!(got, expected);
    }

    #[test]
    fn prop_raw_prefix_rejected(base in prop::collection::vec(any::<u8>(), 1..=16),
                                tail in prop::collection::vec(any::<u8>(), 1..=16)) {
        let mut longer = base.clone();
        longer.extend_from_slice(&tail);

        let mut t: Critnib<Vec<u8>, u64> = Critnib::new();
        t.set(base.clone(), 1).unwrap();
        prop_assert_eq!(t.set(longer.clone(), 2), Err(IndexError::AlreadyExists));

        let mut t: Critnib<Vec<u8>, u64> = Critnib::new();
        t.set(longer, 1).unwrap();
        prop_assert_eq!(t.set(base, 2), Err(IndexError::AlreadyExists));
    }
}

fn for_each_permutation<T: Clone>(items: &[T], mut f: impl FnMut(Vec<T>)) {
    fn rec<T: Clone>(items: &[T], used: &mut [bool], out: &mut Vec<T>, f: &mut impl FnMut(Vec<T>)) {
        if out.len() == items.len() {
            f(out.clone());
            return;
        }
        for i in 0..items.len() {
            if used[i] {
                continue;
            }
            used[i] = true;
            out.push(items[i].clone());
            rec(items, used, out, f);
            out.pop();
            used[i] = false;
        }
    }

    let mut used = vec![false; items.len()];
    let mut out = Vec::with_capacity(items.len());
    rec(items, &mut used, &mut out, &mut f);
}

fn small_key_set() -> Vec<Vec<u8>> {
    vec![
        enc(b"a"),
        enc(b"b"),
        enc(b"c"),
        enc(b"aa"),
        enc(b"ab"),
        enc(b"ba"),
        enc(b""),
    ]
}

#[test]
fn exhaustive_insert_order_small_set() {
    let keys = small_key_set();

    for_each_permutation(&keys, |perm| {
        let mut t: Critnib<Vec<u8>, u64> = Critnib::new();
        let mut m: BTreeMap<Vec<u8>, u64> = BTreeMap::new();

        for (i, k) in perm.into_iter().enumerate() {
            let v = i as u64;
            assert_eq!(t.set(k.clone(), v), Ok(()));
            m.insert(k, v);
            validate_tree(&t);
        }

        let got: Vec<(Vec<u8>, u64)> = t.iter().map(|(k, v)| (k.clone(), *v)).collect();
        let expected: Vec<(Vec<u8>, u64)> = m.into_iter().collect();
        assert_eq!(got, expected);
    });
}

#[test]
fn exhaustive_remove_order_small_set() {
    let keys = small_key_set();

    // Insert in a fixed order, then remove in all permutations.
    let mut base_tree: Critnib<Vec<u8>, u64> = Critnib::new();
    let mut base_map: BTreeMap<Vec<u8>, u64> = BTreeMap::new();
    for (i, k) in keys.iter().enumerate() {
        let v = i as u64;
        base_tree.set(k.clone(), v).unwrap();
        base_map.insert(k.clone(), v);
    }

    for_each_permutation(&keys, |perm| {
        let mut t = base_tree.clone();
        let mut m = base_map.clone();

        for k in perm {
            assert_eq!(t.remove(&k), m.remove(&k));
            assert_eq!(t.len(), m.len());
            validate_tree(&t);
            for (key, value) in &m {
                assert_eq!(t.get(key), Some(value));
            }
        }
        assert_eq!(t.len(), 0);
        assert!(t.root.is_none());
    });
}

fn snapshot(t: &Critnib<Vec<u8>, u64>) -> Vec<(Vec<u8>, u64)> {
    t.iter().map(|(k, v)| (k.clone(), *v)).collect()
}

#[test]
fn failed_branch_allocation_leaves_tree_unchanged() {
    let mut t: Critnib<Vec<u8>, u64> = Critnib::new();
    t.set(enc(b"a"), 1).unwrap();
    t.set(enc(b"b"), 2).unwrap();
    let before = snapshot(&t);
    let (height, leaves, branches) = (t.height(), t.leaves.live(), t.branches.live());

    // Diverges from both stored keys at the length byte, so it needs a branch.
    t.branches.fail_next_reserve = true;
    assert_eq!(t.set(enc(b"zz"), 3), Err(IndexError::OutOfMemory));

    assert_eq!(t.len(), 2);
    assert_eq!(t.height(), height);
    assert_eq!(t.leaves.live(), leaves);
    assert_eq!(t.branches.live(), branches);
    assert_eq!(snapshot(&t), before);
    assert_eq!(t.get(&enc(b"zz")), None);
    validate_tree(&t);

    t.set(enc(b"zz"), 3).unwrap();
    assert_eq!(t.get(&enc(b"zz")), Some(&3));
    assert_eq!(t.height(), height + 1);
    validate_tree(&t);
}

#[test]
fn failed_leaf_allocation_leaves_tree_unchanged() {
    let mut t: Critnib<Vec<u8>, u64> = Critnib::new();

    t.leaves.fail_next_reserve = true;
    assert_eq!(t.set(enc(b"first"), 1), Err(IndexError::OutOfMemory));
    assert!(t.is_empty());
    validate_tree(&t);

    t.set(enc(b"a"), 1).unwrap();
    t.set(enc(b"b"), 2).unwrap();
    let before = snapshot(&t);

    // Lands in a free slot of the existing branch: only a leaf is needed.
    t.leaves.fail_next_reserve = true;
    assert_eq!(t.set(enc(b"c"), 3), Err(IndexError::OutOfMemory));
    assert_eq!(t.len(), 2);
    assert_eq!(t.leaves.live(), 2);
    assert_eq!(snapshot(&t), before);
    validate_tree(&t);

    t.set(enc(b"c"), 3).unwrap();
    assert_eq!(t.len(), 3);
    assert_eq!(t.branches.live(), 1);
    validate_tree(&t);
}
