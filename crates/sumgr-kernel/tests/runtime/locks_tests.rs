use super::*;
use std::sync::Arc;

#[test]
fn lock_mutex_should_recover_poisoned_lock() {
    let shared = Arc::new(Mutex::new(7));
    let poisoner = shared.clone();
    let _ = std::thread::spawn(move || {
        let _guard = poisoner.lock().expect("lock before panic");
        panic!("poison the lock");
    })
    .join();

    assert!(shared.is_poisoned());
    assert_eq!(*lock_mutex(shared.as_ref(), "test_mutex"), 7);
}

#[test]
fn rw_helpers_should_read_and_write() {
    let lock = RwLock::new(vec![1, 2]);
    write_lock(&lock, "test_rw").push(3);
    assert_eq!(read_lock(&lock, "test_rw").as_slice(), &[1, 2, 3]);
}
