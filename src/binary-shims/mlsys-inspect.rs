fn main() { mlsys::entry_points::inspect() }
