mod frames_tests;
