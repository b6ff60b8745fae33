// Object tree property tests.
//
// Property 1: refcount accounting matches a model.
//  - Model: per-slot count of outstanding handles, plus whether slot i is
//    stored in the shared container map.
//  - Invariant: refcount == handles + (stored ? 1 : 0); the node is alive
//    iff that sum is positive.
//  - Operations: make, clone, drop-one, store in map, erase from map.
//
// Property 2: array order matches a Vec model.
//  - Operations: push, set, erase (in and out of range).
//  - Invariant: element contents and length equal the model after every
//    step; out-of-range set/erase leave both unchanged.
//
// Property 3: interning is a function of content.
//  - Invariant: equal strings map to equal keys, different strings to
//    different keys, regardless of insertion order or repetition.
use proptest::prelude::*;
use rc_objtree::{Heap, Obj, Runtime};
use std::collections::HashMap;

proptest! {
    #[test]
    fn prop_refcount_model(ops in proptest::collection::vec((0u8..=4u8, 0usize..6usize), 1..120)) {
        let rt = Runtime::new().unwrap();
        let container = rt.make_map().unwrap();
        let mut handles: Vec<Vec<Obj>> = (0..6).map(|_| Vec::new()).collect();
        let mut stored = [false; 6];
        let mut ids = [None; 6];

        for (op, slot) in ops {
            let key = format!("slot{slot}");
            match op {
                // Make a fresh node for an empty slot.
                0 => {
                    if handles[slot].is_empty() && !stored[slot] {
                        let o = rt.make_string(&key).unwrap();
                        ids[slot] = o.id();
                        handles[slot].push(o);
                    }
                }
                // Clone one handle.
                1 => {
                    if let Some(h) = handles[slot].last() {
                        let c = h.clone();
                        handles[slot].push(c);
                    }
                }
                // Drop one handle.
                2 => {
                    handles[slot].pop();
                }
                // Store in the container (insert fails if already stored).
                3 => {
                    if let Some(h) = handles[slot].last() {
                        let inserted = container.insert(&key, h);
                        prop_assert_eq!(inserted, !stored[slot]);
                        stored[slot] = true;
                    }
                }
                // Erase from the container.
                4 => {
                    let erased = container.erase(&key);
                    prop_assert_eq!(erased, stored[slot]);
                    stored[slot] = false;
                }
                _ => unreachable!(),
            }

            if let Some(id) = ids[slot] {
                let expected = handles[slot].len() + usize::from(stored[slot]);
                let heap = rt.heap();
                if expected == 0 {
                    prop_assert!(!heap.contains(id));
                    drop(heap);
                    ids[slot] = None;
                } else {
                    prop_assert_eq!(heap.refcount(id), Some(expected));
                }
            }
        }

        let live_stored = stored.iter().filter(|s| **s).count();
        prop_assert_eq!(container.size(), live_stored);
    }
}

proptest! {
    #[test]
    fn prop_array_matches_vec(ops in proptest::collection::vec((0u8..=2u8, 0usize..12usize, 0u32..1000u32), 1..100)) {
        let rt = Runtime::new().unwrap();
        let arr = rt.make_array().unwrap();
        let mut model: Vec<String> = Vec::new();

        for (op, idx, val) in ops {
            let text = val.to_string();
            match op {
                0 => {
                    let v = rt.make_string(&text).unwrap();
                    prop_assert!(arr.push(&v));
                    model.push(text);
                }
                1 => {
                    let v = rt.make_string(&text).unwrap();
                    let ok = arr.set_index(idx, &v);
                    prop_assert_eq!(ok, idx < model.len());
                    if ok {
                        model[idx] = text;
                    }
                }
                2 => {
                    let ok = arr.erase_index(idx);
                    prop_assert_eq!(ok, idx < model.len());
                    if ok {
                        model.remove(idx);
                    }
                }
                _ => unreachable!(),
            }

            prop_assert_eq!(arr.size(), model.len());
            for (i, expected) in model.iter().enumerate() {
                let got = arr.get_index(i).as_string();
                prop_assert_eq!(got.as_deref(), Some(expected.as_str()));
            }
        }
    }
}

proptest! {
    #[test]
    fn prop_interning_is_content_addressed(words in proptest::collection::vec("[a-cA-C]{0,3}", 1..60)) {
        let mut h = Heap::new().unwrap();
        let mut seen: HashMap<String, rc_objtree::Key> = HashMap::new();
        for w in &words {
            let k = h.intern(w).unwrap();
            if let Some(prev) = seen.get(w) {
                prop_assert_eq!(*prev, k);
            }
            seen.insert(w.clone(), k);
        }
        // Distinct content, distinct keys.
        let mut keys: Vec<_> = seen.values().copied().collect();
        keys.sort();
        keys.dedup();
        prop_assert_eq!(keys.len(), seen.len());
        for (w, k) in &seen {
            let name = h.key_name(*k);
            prop_assert_eq!(name.as_deref(), Some(w.as_str()));
            prop_assert_eq!(h.lookup_str(w), Some(*k));
        }
    }
}
