mod e2e {
    mod helpers;
    mod test_arithmetic;
    mod test_collections;
    mod test_control_flow;
    mod test_errors;
    mod test_functions;
    mod test_gc;
    mod test_iterators;
    mod test_print;
    mod test_references;
}
