mod test_community;
