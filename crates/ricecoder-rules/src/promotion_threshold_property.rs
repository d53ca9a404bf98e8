/// Property-based tests for promotion threshold evaluation
