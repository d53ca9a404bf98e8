/// Property-based tests for scope resolution and rule precedence ordering
