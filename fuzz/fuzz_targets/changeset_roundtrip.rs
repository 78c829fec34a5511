#![no_main]

use libfuzzer_sys::fuzz_target;
use ropey::Rope;
use the_state::{
  Assoc,
  Change,
  ChangeSet,
};

const ALPHABET: [&str; 6] = ["a", "bc", "\n", "é", "世界", ""];

/// Decode `data` into a document and a list of non-overlapping changes.
fn decode(data: &[u8]) -> Option<(Rope, Vec<Change>)> {
  let (&len, rest) = data.split_first()?;
  let text: String = (0..len as usize)
    .map(|i| ALPHABET[i % ALPHABET.len()])
    .collect();
  let doc = Rope::from(text.as_str());
  let doc_len = doc.len_chars();

  let mut changes = Vec::new();
  let mut cursor = 0;
  for chunk in rest.chunks_exact(3) {
    let from = cursor + chunk[0] as usize % 4;
    let to = from + chunk[1] as usize % 3;
    if to > doc_len {
      break;
    }
    changes.push(Change::replace(from, to, ALPHABET[chunk[2] as usize % ALPHABET.len()]));
    cursor = to;
  }

  Some((doc, changes))
}

fuzz_target!(|data: &[u8]| {
  let Some((doc, changes)) = decode(data) else {
    return;
  };
  let Ok(set) = ChangeSet::of(changes, doc.len_chars()) else {
    return;
  };

  let applied = set.apply_to(&doc).expect("length matches");
  assert_eq!(applied.len_chars(), set.new_len());

  let inverse = set.invert(&doc).expect("inverting against the original");
  let restored = inverse.apply_to(&applied).expect("inverse length matches");
  assert_eq!(restored, doc);

  let composed = set.clone().compose(inverse).expect("lengths line up");
  assert_eq!(composed.apply_to(&doc).expect("composed length"), doc);

  let mut last = 0;
  for offset in 0..=doc.len_chars() {
    let mapped = set.map_offset(offset, Assoc::Before);
    assert!(mapped >= last && mapped <= set.new_len());
    last = mapped;
  }
});
