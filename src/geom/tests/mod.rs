mod test_bvh_basic;
