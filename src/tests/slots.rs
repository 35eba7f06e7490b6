use crate::slots::SlotTable;

#[test]
fn fills_in_order() {
    let mut table = SlotTable::with_capacity(4);
    assert_eq!(table.capacity(), 4);
    assert_eq!(table.len(), 0);
    for i in 0..4 {
        assert_eq!(table.insert(i * 10), i);
    }
    assert_eq!(table.len(), 4);
    assert_eq!(table.get(2), Some(&20));
    assert_eq!(table.get(4), None);
}

#[test]
fn doubles_when_full() {
    let mut table = SlotTable::with_capacity(2);
    table.insert('a');
    table.insert('b');
    assert_eq!(table.insert('c'), 2);
    assert_eq!(table.capacity(), 4);
    assert_eq!(table.insert('d'), 3);
    assert_eq!(table.insert('e'), 4);
    assert_eq!(table.capacity(), 8);

    // Growth never moves existing entries.
    assert_eq!(table.get(0), Some(&'a'));
    assert_eq!(table.get(1), Some(&'b'));
    assert_eq!(table.get(4), Some(&'e'));
}

#[test]
fn reuse_scans_from_len_offset() {
    let mut table = SlotTable::with_capacity(8);
    for i in 0..6 {
        table.insert(i);
    }
    assert_eq!(table.remove(1), Some(1));
    assert_eq!(table.remove(4), Some(4));
    assert_eq!(table.len(), 4);

    // Scanning starts at index 4.
    assert_eq!(table.insert(100), 4);
    // Slot 5 is still taken.
    assert_eq!(table.insert(101), 6);
    assert_eq!(table.insert(102), 7);
    // Wraps around to the hole at 1.
    assert_eq!(table.insert(103), 1);
    assert_eq!(table.len(), 8);
    assert_eq!(table.insert(104), 8);
    assert_eq!(table.capacity(), 16);
}

#[test]
fn remove_empty_slot() {
    let mut table = SlotTable::<u32>::with_capacity(4);
    assert_eq!(table.remove(0), None);
    assert_eq!(table.remove(10), None);
    assert_eq!(table.len(), 0);
}

#[test]
fn zero_capacity_rounds_up() {
    let mut table = SlotTable::with_capacity(0);
    assert_eq!(table.capacity(), 1);
    assert_eq!(table.insert(()), 0);
    assert_eq!(table.insert(()), 1);
    assert_eq!(table.capacity(), 2);
}

#[test]
fn get_mut_and_take_all() {
    let mut table = SlotTable::with_capacity(4);
    let a = table.insert(String::from("a"));
    let b = table.insert(String::from("b"));
    table.get_mut(b).unwrap().push('!');
    table.remove(a);

    let taken = table.take_all();
    assert_eq!(taken, [(b, String::from("b!"))]);
    assert_eq!(table.len(), 0);
    assert_eq!(table.capacity(), 4);
    assert_eq!(table.get(b), None);
}

#[test]
fn take_all_keeps_len_consistent() {
    let mut table = SlotTable::with_capacity(4);
    for i in 0..3 {
        table.insert(i);
    }
    assert_eq!(table.take_all().len(), 3);
    assert_eq!(table.len(), 0);

    // The table behaves as freshly created: filling all four slots does not
    // grow it.
    for i in 0..4 {
        assert_eq!(table.insert(i), i);
    }
    assert_eq!(table.capacity(), 4);
    assert_eq!(table.len(), 4);
    assert_eq!(table.take_all().len(), 4);
}
