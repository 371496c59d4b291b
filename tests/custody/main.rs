// Custody integration tests
