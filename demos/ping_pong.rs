//! Passes a ball between two coroutines through a shared mailbox. Each side
//! keeps its own rally count in a local variable, which lives on the shared
//! stack and is saved and restored on every switch.

use std::cell::RefCell;
use std::rc::Rc;

use sharestack::{Handle, Scheduler, Status};

#[derive(Debug)]
enum Ball {
    Ping(u32),
    Pong(u32),
}

fn player(h: &Handle, mailbox: Rc<RefCell<Vec<Ball>>>, serve: bool) {
    let mut hits = 0;
    if serve {
        mailbox.borrow_mut().push(Ball::Ping(0));
        h.yield_now();
    }
    loop {
        let ball = mailbox.borrow_mut().pop();
        let reply = match ball {
            Some(Ball::Ping(n)) if n < 10 => Ball::Pong(n + 1),
            Some(Ball::Pong(n)) if n < 10 => Ball::Ping(n + 1),
            Some(ball) => {
                println!("{} lets {:?} go after {} hits", h.running().unwrap(), ball, hits);
                // Leave it for the other side so that it stops too.
                mailbox.borrow_mut().push(ball);
                return;
            }
            None => {
                h.yield_now();
                continue;
            }
        };
        hits += 1;
        println!("{} returns {:?}", h.running().unwrap(), reply);
        mailbox.borrow_mut().push(reply);
        h.yield_now();
    }
}

fn main() {
    let scheduler = Scheduler::new();
    let mailbox = Rc::new(RefCell::new(Vec::new()));

    let players = [true, false].map(|serve| {
        let mailbox = mailbox.clone();
        scheduler.spawn(move |h| player(h, mailbox, serve))
    });

    while players.iter().any(|&id| scheduler.status(id).is_alive()) {
        for &id in &players {
            scheduler.resume(id);
        }
    }
    assert!(players.iter().all(|&id| scheduler.status(id) == Status::Dead));
}
