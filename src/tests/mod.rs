mod panics;
mod slots;
